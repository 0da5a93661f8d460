// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Chain access for the xcm-provisioner.
//!
//! The [`Chain`] trait is the seam between the provisioning logic and a node. [`ChainHandle`]
//! implements it for dev nodes through `subxt` and the `dev_*` RPCs, [`BlockPacer`] drives their
//! block production and [`RootScheduler`] dispatches batches with root origin where the endpoint
//! allows it.

pub mod call;
pub mod chain;
mod error;
pub mod handle;
pub mod pacer;
pub mod scheduler;
pub mod value;

pub use call::{compose, BatchedCall, Call};
pub use chain::{
	BlockBuildMode, BlockNumber, Chain, ControlCommand, EmittedEvent, StorageQuery,
	TransactionOutcome,
};
pub use error::ChainError;
pub use handle::{ChainEndpoint, ChainHandle, SubmissionProgress, SubmissionStatus};
pub use pacer::{BlockPacer, PacerConfig, PacerEvent, PacerState};
pub use scheduler::{wrap_as_root_schedule, RootScheduler, ScheduledRootBatch};
pub use subxt::{
	dynamic::Value,
	utils::{AccountId32, H256},
};
pub use subxt_signer::sr25519::Keypair;
pub use value::XcmVersion;

/// Log target of the chain access layer.
pub const LOG_TARGET: &str = "xcm-provisioner::client";
