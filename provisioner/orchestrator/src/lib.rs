// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Provisioning of a multi-chain test environment.
//!
//! Assets are created on an asset-origin chain ([`provisioning`]), registered on destination
//! chains ([`registrar`]), funded there through reserve transfers ([`bridge`]) and paired in XYK
//! pools ([`pools`]). Chains running locally can also be seeded with root-origin batches
//! ([`seeding`]). The [`Orchestrator`] sequences these steps across independently paced chains.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod counter;
mod error;
pub mod orchestrator;
pub mod pools;
pub mod provisioning;
pub mod registrar;
pub mod seeding;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use orchestrator::{
	BridgeReport, BridgedAsset, Chains, FailedTransfer, Orchestrator, ProvisionReport, RunReport,
};

/// Log target of the provisioning phases.
pub const LOG_TARGET: &str = "xcm-provisioner";
