// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

use subxt::utils::H256;
use thiserror::Error;

/// Errors raised while talking to a chain.
#[derive(Error, Debug)]
pub enum ChainError {
	/// The node could not be reached.
	#[error("failed to connect to {url}: {reason}")]
	Connection { url: String, reason: String },
	/// The transaction pool refused, dropped or reported an error for the transaction.
	#[error("transaction rejected by {chain}: {reason}")]
	SubmissionRejected { chain: String, reason: String },
	/// The transaction was included but its dispatch failed.
	#[error("dispatch failed on {chain}: {pallet}::{error}")]
	DispatchFailed { chain: String, pallet: String, error: String },
	/// The transaction was not included within the configured timeout. The transaction may still
	/// land later.
	#[error("transaction {extrinsic_hash:?} not included on {chain} in time")]
	InclusionTimeout { chain: String, extrinsic_hash: H256 },
	/// Block production could not be forced.
	#[error("block production on {chain} failed: {reason}")]
	BlockProduction { chain: String, reason: String },
	/// The chain endpoint does not allow the requested operation.
	#[error("{capability} is not enabled for {chain}")]
	CapabilityDisabled { chain: String, capability: &'static str },
	/// A [`subxt::ext::subxt_rpcs::Error`] wrapper error.
	#[error(transparent)]
	Rpc(#[from] subxt::ext::subxt_rpcs::Error),
	/// A [`subxt::Error`] wrapper error.
	#[error(transparent)]
	Subxt(#[from] subxt::Error),
	/// A value read from the chain did not have the expected shape.
	#[error("unexpected value: {0}")]
	UnexpectedValue(String),
}

impl ChainError {
	/// Whether repeating the failed operation may succeed. A timed out transaction may still be
	/// included, so a retry has to look at the chain state first.
	pub fn is_recoverable(&self) -> bool {
		matches!(self, ChainError::InclusionTimeout { .. } | ChainError::BlockProduction { .. })
	}
}
