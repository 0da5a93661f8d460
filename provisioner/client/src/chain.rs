// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! The [`Chain`] seam between the provisioning logic and a running node.

use crate::{call::BatchedCall, ChainError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use subxt::{dynamic::Value, utils::H256};
use subxt_signer::sr25519::Keypair;

/// Block number type of every chain the provisioner drives.
pub type BlockNumber = u32;

/// Block build mode of a dev node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockBuildMode {
	/// A block is built for every incoming transaction.
	Instant,
	/// Blocks are only built on request.
	Manual,
	/// Transactions are collected and built into a block after a short delay.
	Batch,
}

/// A node control command.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
	/// Build `count` blocks on top of the current best block.
	NewBlock { count: u32 },
	/// Change how the node builds blocks.
	SetBlockBuildMode(BlockBuildMode),
	/// Overwrite runtime storage with the given JSON patch.
	SetStorage(serde_json::Value),
}

/// A storage entry to read.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageQuery {
	pub pallet: String,
	pub entry: String,
	pub keys: Vec<Value>,
}

impl StorageQuery {
	/// Query a plain storage value.
	pub fn plain(pallet: &str, entry: &str) -> Self {
		Self { pallet: pallet.into(), entry: entry.into(), keys: Vec::new() }
	}

	/// Query a storage map entry.
	pub fn map(pallet: &str, entry: &str, keys: impl IntoIterator<Item = Value>) -> Self {
		Self { pallet: pallet.into(), entry: entry.into(), keys: keys.into_iter().collect() }
	}
}

/// An event emitted by a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
	pub pallet: String,
	pub variant: String,
	pub fields: Value,
}

/// Result of a transaction included in a block.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionOutcome {
	pub block_hash: H256,
	pub extrinsic_hash: H256,
	pub block_number: BlockNumber,
	pub events: Vec<EmittedEvent>,
}

impl TransactionOutcome {
	/// Returns the first event matching `pallet` and `variant`.
	pub fn find_event(&self, pallet: &str, variant: &str) -> Option<&EmittedEvent> {
		self.events.iter().find(|event| event.pallet == pallet && event.variant == variant)
	}
}

/// A connection to one chain.
#[async_trait]
pub trait Chain: Send + Sync {
	/// Human readable name used in logs and errors.
	fn name(&self) -> &str;

	/// Whether root-origin calls may be injected through storage overrides.
	fn allows_root_injection(&self) -> bool;

	/// Current best block number.
	async fn best_block_number(&self) -> Result<BlockNumber, ChainError>;

	/// Sign and submit `call`, and wait until it is included in a block.
	async fn submit(
		&self,
		call: &BatchedCall,
		signer: &Keypair,
	) -> Result<TransactionOutcome, ChainError>;

	/// Read a storage entry at the best block.
	async fn fetch(&self, query: &StorageQuery) -> Result<Option<Value>, ChainError>;

	/// SCALE encoded runtime call of `call`.
	fn encode_call(&self, call: &BatchedCall) -> Result<Vec<u8>, ChainError>;

	/// Execute a node control command.
	async fn control(&self, command: ControlCommand) -> Result<(), ChainError>;
}

#[cfg(test)]
pub mod test {
	use super::*;
	use std::sync::{
		atomic::{AtomicBool, AtomicU32, Ordering},
		Arc,
	};

	/// A chain that only counts blocks.
	#[derive(Default)]
	pub struct CountingChain {
		pub root_injection: bool,
		pub height: AtomicU32,
		/// Number of upcoming block production requests to fail.
		pub failures: AtomicU32,
		/// Block production requests are accepted but no block is built.
		pub stalled: AtomicBool,
		pub commands: parking_lot::Mutex<Vec<ControlCommand>>,
	}

	impl CountingChain {
		pub fn new() -> Arc<Self> {
			Arc::new(Self::default())
		}

		pub fn with_root_injection() -> Arc<Self> {
			Arc::new(Self { root_injection: true, ..Default::default() })
		}

		pub fn height(&self) -> BlockNumber {
			self.height.load(Ordering::SeqCst)
		}

		pub fn commands(&self) -> Vec<ControlCommand> {
			self.commands.lock().clone()
		}
	}

	#[async_trait]
	impl Chain for CountingChain {
		fn name(&self) -> &str {
			"counting"
		}

		fn allows_root_injection(&self) -> bool {
			self.root_injection
		}

		async fn best_block_number(&self) -> Result<BlockNumber, ChainError> {
			Ok(self.height())
		}

		async fn submit(
			&self,
			_call: &BatchedCall,
			_signer: &Keypair,
		) -> Result<TransactionOutcome, ChainError> {
			Err(ChainError::SubmissionRejected {
				chain: self.name().into(),
				reason: "not supported".into(),
			})
		}

		async fn fetch(&self, _query: &StorageQuery) -> Result<Option<Value>, ChainError> {
			Ok(None)
		}

		fn encode_call(&self, call: &BatchedCall) -> Result<Vec<u8>, ChainError> {
			Ok(call.calls().iter().map(|call| call.name().len() as u8).collect())
		}

		async fn control(&self, command: ControlCommand) -> Result<(), ChainError> {
			self.commands.lock().push(command.clone());
			if let ControlCommand::NewBlock { count } = command {
				let failed = self
					.failures
					.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
					.is_ok();
				if failed {
					return Err(ChainError::BlockProduction {
						chain: self.name().into(),
						reason: "injected failure".into(),
					})
				}
				if !self.stalled.load(Ordering::SeqCst) {
					self.height.fetch_add(count, Ordering::SeqCst);
				}
			}
			Ok(())
		}
	}
}
