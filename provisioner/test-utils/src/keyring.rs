// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Utilities for working with test accounts.

pub use subxt_signer::sr25519::dev::alice;
use xcm_provisioner_client::Keypair;

/// Raw account id of `signer`.
pub fn account_of(signer: &Keypair) -> [u8; 32] {
	signer.public_key().0
}
