// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Deterministic block production for dev nodes.
//!
//! A [`BlockPacer`] either runs a background task forcing a block every interval, or stays idle
//! and builds blocks only when [`BlockPacer::advance`] is called. Both modes support `advance`,
//! which is how the orchestrator steps chains forward in causal order.

use crate::{
	chain::{BlockBuildMode, BlockNumber, Chain, ControlCommand},
	ChainError, LOG_TARGET,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Default interval between forced blocks of a running pacer.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(6000);

/// Default time [`BlockPacer::advance`] waits for the requested blocks.
pub const DEFAULT_ADVANCE_TIMEOUT: Duration = Duration::from_secs(60);

const ADVANCE_POLL_INTERVAL: Duration = Duration::from_millis(50);

const EVENTS_CAPACITY: usize = 16;

fn default_interval_ms() -> u64 {
	DEFAULT_INTERVAL.as_millis() as u64
}

/// How the pacer of an endpoint is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum PacerConfig {
	/// Force a block every `interval_ms`.
	Instant {
		#[serde(default = "default_interval_ms")]
		interval_ms: u64,
	},
	/// Only build blocks on [`BlockPacer::advance`].
	Manual,
	/// No pacing, the node produces blocks on its own.
	Off,
}

impl Default for PacerConfig {
	fn default() -> Self {
		PacerConfig::Instant { interval_ms: default_interval_ms() }
	}
}

/// State of a [`BlockPacer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacerState {
	Stopped,
	Running { interval: Duration },
	Manual,
}

/// Notifications published by a pacer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacerEvent {
	/// A block was forced by the running task.
	Produced { chain: String, block_number: BlockNumber },
	/// The running task failed to force a block and keeps going.
	ProductionFailed { chain: String, reason: String },
}

/// Drives block production of one chain.
pub struct BlockPacer {
	chain: Arc<dyn Chain>,
	state: PacerState,
	task: Option<(CancellationToken, JoinHandle<()>)>,
	events: broadcast::Sender<PacerEvent>,
	advance_timeout: Duration,
}

impl BlockPacer {
	pub fn new(chain: Arc<dyn Chain>) -> Self {
		Self {
			chain,
			state: PacerState::Stopped,
			task: None,
			events: broadcast::channel(EVENTS_CAPACITY).0,
			advance_timeout: DEFAULT_ADVANCE_TIMEOUT,
		}
	}

	/// Set how long [`Self::advance`] waits for the requested blocks.
	pub fn with_advance_timeout(mut self, timeout: Duration) -> Self {
		self.advance_timeout = timeout;
		self
	}

	pub fn state(&self) -> PacerState {
		self.state
	}

	pub fn chain(&self) -> &Arc<dyn Chain> {
		&self.chain
	}

	/// Subscribe to production events of the running task.
	pub fn subscribe(&self) -> broadcast::Receiver<PacerEvent> {
		self.events.subscribe()
	}

	/// Start pacing according to `config`. A pacer that is already started is restarted.
	pub async fn start(&mut self, config: PacerConfig) {
		self.stop().await;
		match config {
			PacerConfig::Instant { interval_ms } => {
				self.start_running(Duration::from_millis(interval_ms))
			},
			PacerConfig::Manual => {
				log::debug!(target: LOG_TARGET, "Pacing {} manually", self.chain.name());
				self.state = PacerState::Manual;
			},
			PacerConfig::Off => {},
		}
	}

	fn start_running(&mut self, interval: Duration) {
		log::info!(
			target: LOG_TARGET,
			"⏱️ Producing a block on {} every {}ms",
			self.chain.name(),
			interval.as_millis()
		);
		let token = CancellationToken::new();
		let handle = tokio::spawn(produce_blocks(
			self.chain.clone(),
			interval,
			token.clone(),
			self.events.clone(),
		));
		self.task = Some((token, handle));
		self.state = PacerState::Running { interval };
	}

	/// Stop pacing and wait for the running task to exit.
	pub async fn stop(&mut self) {
		if let Some((token, handle)) = self.task.take() {
			token.cancel();
			if let Err(err) = handle.await {
				log::warn!(
					target: LOG_TARGET,
					"Pacer task of {} ended abnormally: {err:?}",
					self.chain.name()
				);
			}
			log::debug!(target: LOG_TARGET, "Stopped pacing {}", self.chain.name());
		}
		self.state = PacerState::Stopped;
	}

	/// Switch the node's block build mode. Returns once the node acknowledged the change.
	pub async fn set_build_mode(&self, mode: BlockBuildMode) -> Result<(), ChainError> {
		log::debug!(
			target: LOG_TARGET,
			"Setting block build mode of {} to {mode:?}",
			self.chain.name()
		);
		self.chain.control(ControlCommand::SetBlockBuildMode(mode)).await
	}

	/// Build `count` blocks and wait until the chain reports them. `advance(0)` returns
	/// immediately without contacting the node.
	pub async fn advance(&self, count: u32) -> Result<(), ChainError> {
		if count == 0 {
			return Ok(())
		}
		let start = self.chain.best_block_number().await?;
		let target = start.saturating_add(count);
		self.chain.control(ControlCommand::NewBlock { count }).await.map_err(|err| {
			ChainError::BlockProduction {
				chain: self.chain.name().to_string(),
				reason: err.to_string(),
			}
		})?;

		let wait = async {
			loop {
				let best = self.chain.best_block_number().await?;
				if best >= target {
					return Ok::<_, ChainError>(best)
				}
				tokio::time::sleep(ADVANCE_POLL_INTERVAL).await;
			}
		};
		let best = tokio::time::timeout(self.advance_timeout, wait).await.map_err(|_| {
			ChainError::BlockProduction {
				chain: self.chain.name().to_string(),
				reason: format!("block #{target} not reported within {:?}", self.advance_timeout),
			}
		})??;
		log::debug!(
			target: LOG_TARGET,
			"Advanced {} by {count} block(s) to #{best}",
			self.chain.name()
		);
		Ok(())
	}
}

impl Drop for BlockPacer {
	fn drop(&mut self) {
		if let Some((token, _)) = self.task.take() {
			token.cancel();
		}
	}
}

async fn produce_blocks(
	chain: Arc<dyn Chain>,
	interval: Duration,
	token: CancellationToken,
	events: broadcast::Sender<PacerEvent>,
) {
	let mut ticker = tokio::time::interval(interval);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
	// The first tick completes immediately.
	ticker.tick().await;

	loop {
		tokio::select! {
			_ = token.cancelled() => break,
			_ = ticker.tick() => {},
		}

		let produced = match chain.control(ControlCommand::NewBlock { count: 1 }).await {
			Ok(()) => chain.best_block_number().await,
			Err(err) => Err(err),
		};
		// Sending only fails when nobody is subscribed.
		let _ = match produced {
			Ok(block_number) => {
				log::trace!(
					target: LOG_TARGET,
					"Produced block #{block_number} on {}",
					chain.name()
				);
				events.send(PacerEvent::Produced { chain: chain.name().to_string(), block_number })
			},
			Err(err) => {
				log::warn!(
					target: LOG_TARGET,
					"Failed to produce a block on {}: {err}",
					chain.name()
				);
				events.send(PacerEvent::ProductionFailed {
					chain: chain.name().to_string(),
					reason: err.to_string(),
				})
			},
		};
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::chain::test::CountingChain;
	use pretty_assertions::assert_eq;
	use std::sync::atomic::Ordering;

	#[tokio::test]
	async fn advance_waits_for_exactly_n_blocks() {
		let chain = CountingChain::new();
		let mut pacer = BlockPacer::new(chain.clone());
		pacer.start(PacerConfig::Manual).await;
		assert_eq!(pacer.state(), PacerState::Manual);

		pacer.advance(3).await.unwrap();
		assert_eq!(chain.height(), 3);
		assert_eq!(chain.commands(), vec![ControlCommand::NewBlock { count: 3 }]);
	}

	#[tokio::test]
	async fn advance_zero_is_a_no_op() {
		let chain = CountingChain::new();
		let pacer = BlockPacer::new(chain.clone());
		pacer.advance(0).await.unwrap();
		assert!(chain.commands().is_empty());
	}

	#[tokio::test]
	async fn advance_reports_production_failure() {
		let chain = CountingChain::new();
		chain.failures.store(1, Ordering::SeqCst);
		let pacer = BlockPacer::new(chain.clone());
		let err = pacer.advance(1).await.unwrap_err();
		assert!(matches!(err, ChainError::BlockProduction { .. }), "{err:?}");
	}

	#[tokio::test(start_paused = true)]
	async fn advance_gives_up_on_a_stalled_chain() {
		let chain = CountingChain::new();
		chain.stalled.store(true, Ordering::SeqCst);
		let pacer = BlockPacer::new(chain.clone()).with_advance_timeout(Duration::from_secs(2));

		let err = pacer.advance(1).await.unwrap_err();
		assert!(
			matches!(&err, ChainError::BlockProduction { reason, .. } if reason.contains("#1")),
			"{err:?}"
		);
		assert_eq!(chain.commands(), vec![ControlCommand::NewBlock { count: 1 }]);
	}

	#[tokio::test(start_paused = true)]
	async fn running_pacer_survives_failed_ticks() {
		let _ = env_logger::builder().is_test(true).try_init();
		let chain = CountingChain::new();
		chain.failures.store(1, Ordering::SeqCst);
		let mut pacer = BlockPacer::new(chain.clone());
		let mut events = pacer.subscribe();

		pacer.start(PacerConfig::Instant { interval_ms: 100 }).await;
		assert_eq!(pacer.state(), PacerState::Running { interval: Duration::from_millis(100) });

		assert!(matches!(events.recv().await.unwrap(), PacerEvent::ProductionFailed { .. }));
		assert_eq!(
			events.recv().await.unwrap(),
			PacerEvent::Produced { chain: "counting".into(), block_number: 1 }
		);
		assert_eq!(
			events.recv().await.unwrap(),
			PacerEvent::Produced { chain: "counting".into(), block_number: 2 }
		);

		pacer.stop().await;
		assert_eq!(pacer.state(), PacerState::Stopped);
		let height = chain.height();
		tokio::time::sleep(Duration::from_secs(1)).await;
		assert_eq!(chain.height(), height);
	}

	#[tokio::test]
	async fn set_build_mode_issues_command() {
		let chain = CountingChain::new();
		let pacer = BlockPacer::new(chain.clone());
		pacer.set_build_mode(BlockBuildMode::Instant).await.unwrap();
		assert_eq!(
			chain.commands(),
			vec![ControlCommand::SetBlockBuildMode(BlockBuildMode::Instant)]
		);
	}

	#[test]
	fn config_parses_from_json() {
		let config: PacerConfig = serde_json::from_str(r#"{"mode":"instant"}"#).unwrap();
		assert_eq!(config, PacerConfig::Instant { interval_ms: 6000 });
		let config: PacerConfig = serde_json::from_str(r#"{"mode":"manual"}"#).unwrap();
		assert_eq!(config, PacerConfig::Manual);
		let config: PacerConfig = serde_json::from_str(r#"{"mode":"off"}"#).unwrap();
		assert_eq!(config, PacerConfig::Off);
	}
}
