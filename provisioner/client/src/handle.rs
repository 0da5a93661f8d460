// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! The [`ChainHandle`] connects to a dev node and implements [`Chain`] on top of `subxt`.

use crate::{
	call::BatchedCall,
	chain::{
		BlockNumber, Chain, ControlCommand, EmittedEvent, StorageQuery, TransactionOutcome,
	},
	pacer::PacerConfig,
	ChainError, LOG_TARGET,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{future::Future, sync::Arc, time::Duration};
use subxt::{
	backend::{
		legacy::LegacyRpcMethods,
		rpc::{
			reconnecting_rpc_client::{ExponentialBackoff, RpcClient as ReconnectingRpcClient},
			RpcClient,
		},
	},
	config::Header,
	dynamic::Value,
	error::DispatchError,
	ext::{scale_value::ValueDef, subxt_rpcs::rpc_params},
	tx::{TxInBlock, TxProgress, TxStatus},
	utils::H256,
	OnlineClient, SubstrateConfig,
};
use subxt_signer::sr25519::Keypair;
use tokio::sync::{broadcast, Mutex};

/// Default time a submission may take to be included in a block.
pub const DEFAULT_INCLUSION_TIMEOUT: Duration = Duration::from_secs(120);

const PROGRESS_CAPACITY: usize = 16;

fn default_inclusion_timeout_ms() -> u64 {
	DEFAULT_INCLUSION_TIMEOUT.as_millis() as u64
}

/// A chain instance the provisioner drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEndpoint {
	/// Name used in logs.
	pub name: String,
	/// Websocket address of the node.
	pub url: String,
	#[serde(default)]
	pub pacer: PacerConfig,
	/// Allow dispatching root-origin calls through storage overrides.
	#[serde(default)]
	pub allow_root_injection: bool,
	#[serde(default = "default_inclusion_timeout_ms")]
	pub inclusion_timeout_ms: u64,
}

impl ChainEndpoint {
	pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			url: url.into(),
			pacer: PacerConfig::default(),
			allow_root_injection: false,
			inclusion_timeout_ms: default_inclusion_timeout_ms(),
		}
	}

	pub fn inclusion_timeout(&self) -> Duration {
		Duration::from_millis(self.inclusion_timeout_ms)
	}
}

/// Intermediate status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionStatus {
	Validated,
	Broadcasted,
	NoLongerInBestBlock,
	InBlock { block_hash: H256 },
}

/// Progress notification of a transaction submitted through a [`ChainHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionProgress {
	pub extrinsic_hash: H256,
	pub status: SubmissionStatus,
}

type Progress = TxProgress<SubstrateConfig, OnlineClient<SubstrateConfig>>;
type InBlock = TxInBlock<SubstrateConfig, OnlineClient<SubstrateConfig>>;

/// A transaction status reported by the node. `B` is what the inclusion yields.
enum Observed<B> {
	Validated,
	Broadcasted,
	Retracted,
	Included { block_hash: H256, block: B },
	Rejected(String),
}

impl From<TxStatus<SubstrateConfig, OnlineClient<SubstrateConfig>>> for Observed<InBlock> {
	fn from(status: TxStatus<SubstrateConfig, OnlineClient<SubstrateConfig>>) -> Self {
		match status {
			TxStatus::Validated => Observed::Validated,
			TxStatus::Broadcasted { .. } => Observed::Broadcasted,
			TxStatus::NoLongerInBestBlock => Observed::Retracted,
			TxStatus::InBestBlock(block) | TxStatus::InFinalizedBlock(block) => {
				Observed::Included { block_hash: block.block_hash(), block }
			},
			TxStatus::Error { message } |
			TxStatus::Invalid { message } |
			TxStatus::Dropped { message } => Observed::Rejected(message),
		}
	}
}

/// Fans intermediate transaction statuses out to subscribers.
#[derive(Clone)]
struct ProgressChannel {
	sender: broadcast::Sender<SubmissionProgress>,
}

impl ProgressChannel {
	fn new() -> Self {
		Self { sender: broadcast::channel(PROGRESS_CAPACITY).0 }
	}

	fn subscribe(&self) -> broadcast::Receiver<SubmissionProgress> {
		self.sender.subscribe()
	}

	/// Publish `status` of `extrinsic_hash` on `chain`. Returns the inclusion or the rejection
	/// reason once the transaction reached either, `None` while it is pending.
	fn track<B>(
		&self,
		chain: &str,
		extrinsic_hash: H256,
		status: Observed<B>,
	) -> Option<Result<B, String>> {
		let (status, outcome) = match status {
			Observed::Validated => (SubmissionStatus::Validated, None),
			Observed::Broadcasted => (SubmissionStatus::Broadcasted, None),
			Observed::Retracted => {
				log::warn!(
					target: LOG_TARGET,
					"Transaction {extrinsic_hash:?} retracted from the best chain of {chain}"
				);
				(SubmissionStatus::NoLongerInBestBlock, None)
			},
			Observed::Included { block_hash, block } => {
				(SubmissionStatus::InBlock { block_hash }, Some(Ok(block)))
			},
			Observed::Rejected(reason) => return Some(Err(reason)),
		};
		// Sending only fails when nobody is subscribed.
		let _ = self.sender.send(SubmissionProgress { extrinsic_hash, status });
		outcome
	}
}

/// Wait for `inclusion` of `extrinsic_hash`, giving up after `timeout`.
///
/// The transaction may still be included after [`ChainError::InclusionTimeout`] is returned.
async fn within_inclusion_timeout<T>(
	chain: &str,
	extrinsic_hash: H256,
	timeout: Duration,
	inclusion: impl Future<Output = Result<T, ChainError>>,
) -> Result<T, ChainError> {
	tokio::time::timeout(timeout, inclusion).await.map_err(|_| {
		log::warn!(
			target: LOG_TARGET,
			"Transaction {extrinsic_hash:?} not included on {chain} within {timeout:?}"
		);
		ChainError::InclusionTimeout { chain: chain.to_string(), extrinsic_hash }
	})?
}

/// A connection to a dev node.
#[derive(Clone)]
pub struct ChainHandle {
	endpoint: ChainEndpoint,
	api: OnlineClient<SubstrateConfig>,
	rpc_client: RpcClient,
	rpc: LegacyRpcMethods<SubstrateConfig>,
	/// Latest block number observed through an inclusion or a query.
	observed_block: Arc<RwLock<BlockNumber>>,
	/// Notifies subscribers of intermediate transaction statuses.
	progress: ProgressChannel,
	/// Serializes submissions so nonces are consumed in order.
	tx_lock: Arc<Mutex<()>>,
}

fn to_block_number(number: impl Into<u64>) -> Result<BlockNumber, ChainError> {
	let number = number.into();
	BlockNumber::try_from(number)
		.map_err(|_| ChainError::UnexpectedValue(format!("block number {number} exceeds u32")))
}

impl ChainHandle {
	/// Connect to the node of `endpoint`.
	pub async fn connect(endpoint: ChainEndpoint) -> Result<Self, ChainError> {
		let connection_error =
			|reason: String| ChainError::Connection { url: endpoint.url.clone(), reason };

		log::info!(
			target: LOG_TARGET,
			"🌐 Connecting to {} at {} ...",
			endpoint.name,
			endpoint.url
		);
		let rpc_client = ReconnectingRpcClient::builder()
			.retry_policy(ExponentialBackoff::from_millis(100).max_delay(Duration::from_secs(10)))
			.build(endpoint.url.clone())
			.await
			.map_err(|err| connection_error(err.to_string()))?;
		let rpc_client = RpcClient::new(rpc_client);
		let api = OnlineClient::<SubstrateConfig>::from_rpc_client(rpc_client.clone())
			.await
			.map_err(|err| connection_error(err.to_string()))?;
		let rpc = LegacyRpcMethods::<SubstrateConfig>::new(rpc_client.clone());
		log::info!(target: LOG_TARGET, "🌟 Connected to {} at {}", endpoint.name, endpoint.url);

		let handle = Self {
			endpoint,
			api,
			rpc_client,
			rpc,
			observed_block: Default::default(),
			progress: ProgressChannel::new(),
			tx_lock: Arc::new(Mutex::new(())),
		};
		handle.best_block_number().await?;
		Ok(handle)
	}

	pub fn endpoint(&self) -> &ChainEndpoint {
		&self.endpoint
	}

	/// Latest block number observed without querying the node.
	pub fn observed_block_number(&self) -> BlockNumber {
		*self.observed_block.read()
	}

	/// Subscribe to intermediate statuses of submitted transactions.
	pub fn subscribe_progress(&self) -> broadcast::Receiver<SubmissionProgress> {
		self.progress.subscribe()
	}

	fn observe(&self, number: BlockNumber) {
		let mut observed = self.observed_block.write();
		if number > *observed {
			*observed = number;
		}
	}

	fn rejected(&self, reason: impl ToString) -> ChainError {
		ChainError::SubmissionRejected {
			chain: self.endpoint.name.clone(),
			reason: reason.to_string(),
		}
	}

	/// Map a failed dispatch to [`ChainError::DispatchFailed`].
	fn dispatch_error(&self, err: subxt::Error) -> ChainError {
		let chain = self.endpoint.name.clone();
		match err {
			subxt::Error::Runtime(DispatchError::Module(module_error)) => {
				match module_error.details() {
					Ok(details) => ChainError::DispatchFailed {
						chain,
						pallet: details.pallet.name().to_string(),
						error: details.variant.name.clone(),
					},
					Err(_) => ChainError::DispatchFailed {
						chain,
						pallet: "Unknown".into(),
						error: format!("{module_error:?}"),
					},
				}
			},
			subxt::Error::Runtime(other) => {
				let error = other.to_string();
				ChainError::DispatchFailed { chain, pallet: "System".into(), error }
			},
			other => other.into(),
		}
	}

	/// Follow `progress` until the transaction is in a block.
	async fn wait_for_inclusion(
		&self,
		progress: &mut Progress,
		extrinsic_hash: H256,
	) -> Result<InBlock, ChainError> {
		while let Some(status) = progress.next().await {
			let observed = Observed::from(status?);
			let tracked = self.progress.track(&self.endpoint.name, extrinsic_hash, observed);
			if let Some(outcome) = tracked {
				return outcome.map_err(|reason| self.rejected(reason))
			}
		}
		Err(self.rejected("transaction status stream ended"))
	}
}

#[async_trait]
impl Chain for ChainHandle {
	fn name(&self) -> &str {
		&self.endpoint.name
	}

	fn allows_root_injection(&self) -> bool {
		self.endpoint.allow_root_injection
	}

	async fn best_block_number(&self) -> Result<BlockNumber, ChainError> {
		let header = self
			.rpc
			.chain_get_header(None)
			.await?
			.ok_or_else(|| ChainError::UnexpectedValue("node returned no best header".into()))?;
		let number = to_block_number(header.number())?;
		self.observe(number);
		Ok(number)
	}

	async fn submit(
		&self,
		call: &BatchedCall,
		signer: &Keypair,
	) -> Result<TransactionOutcome, ChainError> {
		let payload = call.payload();
		let _lock = self.tx_lock.lock().await;

		let mut progress = self
			.api
			.tx()
			.sign_and_submit_then_watch_default(&payload, signer)
			.await
			.map_err(|err| self.rejected(err))?;
		let extrinsic_hash = progress.extrinsic_hash();
		log::debug!(
			target: LOG_TARGET,
			"Submitted {} call(s) to {} as {extrinsic_hash:?}",
			call.len(),
			self.endpoint.name
		);

		let in_block = within_inclusion_timeout(
			&self.endpoint.name,
			extrinsic_hash,
			self.endpoint.inclusion_timeout(),
			self.wait_for_inclusion(&mut progress, extrinsic_hash),
		)
		.await?;

		let block_hash = in_block.block_hash();
		let events = in_block.wait_for_success().await.map_err(|err| self.dispatch_error(err))?;
		let events = events
			.iter()
			.map(|event| {
				let event = event?;
				let fields =
					Value { value: ValueDef::Composite(event.field_values()?), context: 0u32 };
				Ok(EmittedEvent {
					pallet: event.pallet_name().to_string(),
					variant: event.variant_name().to_string(),
					fields: fields.remove_context(),
				})
			})
			.collect::<Result<Vec<_>, subxt::Error>>()?;

		let block_number = to_block_number(self.api.blocks().at(block_hash).await?.number())?;
		self.observe(block_number);
		log::info!(
			target: LOG_TARGET,
			"✅ {} call(s) included in {} block #{block_number} ({block_hash:?})",
			call.len(),
			self.endpoint.name
		);

		Ok(TransactionOutcome { block_hash, extrinsic_hash, block_number, events })
	}

	async fn fetch(&self, query: &StorageQuery) -> Result<Option<Value>, ChainError> {
		let keys = query.keys.clone();
		let address = subxt::dynamic::storage(query.pallet.as_str(), query.entry.as_str(), keys);
		let best = self
			.rpc
			.chain_get_block_hash(None)
			.await?
			.ok_or_else(|| ChainError::UnexpectedValue("node returned no best hash".into()))?;
		let value = self.api.storage().at(best).fetch(&address).await?;
		Ok(value.map(|thunk| thunk.to_value()).transpose().map_err(subxt::Error::from)?.map(|value| value.remove_context()))
	}

	fn encode_call(&self, call: &BatchedCall) -> Result<Vec<u8>, ChainError> {
		Ok(self.api.tx().call_data(&call.payload())?)
	}

	async fn control(&self, command: ControlCommand) -> Result<(), ChainError> {
		match command {
			ControlCommand::NewBlock { count } => {
				self.rpc_client
					.request::<serde_json::Value>(
						"dev_newBlock",
						rpc_params![json!({ "count": count })],
					)
					.await
					.map_err(|err| ChainError::BlockProduction {
						chain: self.endpoint.name.clone(),
						reason: err.to_string(),
					})?;
			},
			ControlCommand::SetBlockBuildMode(mode) => {
				self.rpc_client
					.request::<serde_json::Value>("dev_setBlockBuildMode", rpc_params![mode])
					.await?;
			},
			ControlCommand::SetStorage(patch) => {
				self.rpc_client
					.request::<serde_json::Value>("dev_setStorage", rpc_params![patch])
					.await?;
			},
		}
		Ok(())
	}
}
