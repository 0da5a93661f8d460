// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;
use xcm_provisioner_client::ChainError;
use xcm_provisioner_primitives::{AssetId, Location, PriceError};

/// Errors of the provisioning phases.
#[derive(Error, Debug)]
pub enum Error {
	/// A [`ChainError`] wrapper error.
	#[error(transparent)]
	Chain(#[from] ChainError),
	/// The origin chain refused to send the reserve transfer of an asset.
	#[error("reserve transfer of asset {asset_id} rejected by {chain}: {pallet}::{error}")]
	XcmSendRejected { chain: String, asset_id: AssetId, pallet: String, error: String },
	/// An identifier allocated by a chain is not the one predicted before submission.
	#[error("{counter} on {chain}: expected {expected}, found {found:?}")]
	IdentifierPredictionMismatch {
		chain: String,
		counter: String,
		expected: AssetId,
		found: Option<AssetId>,
	},
	/// Allocating identifiers from a counter would exceed the largest [`AssetId`].
	#[error("{counter} on {chain} cannot allocate {count} identifier(s) starting at {start}")]
	IdentifierOverflow { chain: String, counter: String, start: AssetId, count: usize },
	/// The location is already registered on the destination chain.
	#[error("{location} is already registered on {chain} as asset {asset_id}")]
	AlreadyRegistered { chain: String, location: Location, asset_id: AssetId },
	/// The chain exposes no identifier counter and no fallback is configured.
	#[error("{chain} has no {counter} and no fallback identifier is configured")]
	MissingCounter { chain: String, counter: String },
	/// The signer does not hold the asset required by an operation.
	#[error("account 0x{account} holds no asset {asset_id} on {chain}")]
	InsufficientBalance { chain: String, asset_id: AssetId, account: String },
	/// An account could not be parsed as SS58 address or hex.
	#[error("invalid account `{0}`")]
	InvalidAccount(String),
	/// A [`PriceError`] wrapper error.
	#[error(transparent)]
	Price(#[from] PriceError),
	/// A metadata file could not be read or written.
	#[error("{}: {reason}", path.display())]
	Store { path: PathBuf, reason: String },
	/// The configuration is invalid.
	#[error("invalid configuration: {0}")]
	Config(String),
}

impl Error {
	/// Whether running the failed phase again may succeed, see [`ChainError::is_recoverable`].
	pub fn is_recoverable(&self) -> bool {
		matches!(self, Error::Chain(err) if err.is_recoverable())
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
