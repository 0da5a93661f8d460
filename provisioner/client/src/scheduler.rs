// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Root-origin execution of batches on dev nodes.
//!
//! A dev node lets us overwrite runtime storage. Inserting an entry into the scheduler agenda for
//! the next block makes the runtime dispatch the batch with `Root` origin when that block is
//! built. This is only meant for sandboxed chains and has to be enabled per endpoint.

use crate::{
	call::BatchedCall,
	chain::{BlockNumber, Chain, ControlCommand},
	ChainError, LOG_TARGET,
};
use serde_json::json;
use std::sync::Arc;

/// An encoded batch together with the block it is scheduled for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRootBatch {
	pub call_data: Vec<u8>,
	pub target: BlockNumber,
}

/// Schedule `call_data` for root-origin dispatch at `target`.
pub fn wrap_as_root_schedule(call_data: Vec<u8>, target: BlockNumber) -> ScheduledRootBatch {
	ScheduledRootBatch { call_data, target }
}

impl ScheduledRootBatch {
	/// The `dev_setStorage` patch inserting this batch into `Scheduler::Agenda`.
	pub fn storage_patch(&self) -> serde_json::Value {
		json!({
			"scheduler": {
				"agenda": [[
					[self.target],
					[{
						"call": { "Inline": format!("0x{}", hex::encode(&self.call_data)) },
						"origin": { "system": "Root" },
					}],
				]],
			},
		})
	}
}

/// Capability to dispatch batches with root origin on one chain.
pub struct RootScheduler {
	chain: Arc<dyn Chain>,
}

impl RootScheduler {
	/// Fails with [`ChainError::CapabilityDisabled`] unless the chain allows root injection.
	pub fn new(chain: Arc<dyn Chain>) -> Result<Self, ChainError> {
		if !chain.allows_root_injection() {
			return Err(ChainError::CapabilityDisabled {
				chain: chain.name().to_string(),
				capability: "root injection",
			})
		}
		Ok(Self { chain })
	}

	pub fn chain(&self) -> &Arc<dyn Chain> {
		&self.chain
	}

	/// Schedule `batch` for the next block and build that block. Returns the block the batch was
	/// dispatched in.
	pub async fn schedule(&self, batch: &BatchedCall) -> Result<BlockNumber, ChainError> {
		let call_data = self.chain.encode_call(batch)?;
		let target = self.chain.best_block_number().await? + 1;
		let scheduled = wrap_as_root_schedule(call_data, target);

		log::debug!(
			target: LOG_TARGET,
			"Scheduling {} root call(s) on {} at #{target}",
			batch.len(),
			self.chain.name()
		);
		self.chain.control(ControlCommand::SetStorage(scheduled.storage_patch())).await?;
		self.chain.control(ControlCommand::NewBlock { count: 1 }).await?;

		let best = self.chain.best_block_number().await?;
		if best < target {
			return Err(ChainError::BlockProduction {
				chain: self.chain.name().to_string(),
				reason: format!("scheduled block #{target} was not built, best is #{best}"),
			})
		}
		Ok(target)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		call::{compose, Call},
		chain::test::CountingChain,
	};
	use assert_matches::assert_matches;
	use pretty_assertions::assert_eq;
	use subxt::dynamic::Value;

	#[test]
	fn patch_inserts_agenda_entry_with_root_origin() {
		let patch = wrap_as_root_schedule(vec![0x01, 0xff], 42).storage_patch();
		assert_eq!(
			patch,
			json!({
				"scheduler": {
					"agenda": [[[42], [{ "call": { "Inline": "0x01ff" }, "origin": { "system": "Root" } }]]]
				}
			})
		);
	}

	#[test]
	fn refused_without_capability() {
		let chain = CountingChain::new();
		assert_matches!(
			RootScheduler::new(chain).err(),
			Some(ChainError::CapabilityDisabled { capability: "root injection", .. })
		);
	}

	#[tokio::test]
	async fn schedules_for_next_block_and_builds_it() {
		let chain = CountingChain::with_root_injection();
		chain.height.store(10, std::sync::atomic::Ordering::SeqCst);
		let scheduler = RootScheduler::new(chain.clone()).unwrap();

		let batch = compose([Call::new("System", "remark", [("remark", Value::from_bytes("x"))])]);
		assert_eq!(scheduler.schedule(&batch).await.unwrap(), 11);
		assert_eq!(chain.height(), 11);

		let commands = chain.commands();
		assert_matches!(
			commands.as_slice(),
			[ControlCommand::SetStorage(_), ControlCommand::NewBlock { count: 1 }]
		);
	}
}
