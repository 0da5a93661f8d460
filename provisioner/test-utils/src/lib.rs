// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Test helpers for the xcm-provisioner: in-memory chains connected by a mock network and the
//! dev accounts used to sign on them.

pub mod chain;
pub mod keyring;
pub mod network;

pub use chain::{MockChain, DEFAULT_REGISTRY_ID_OFFSET};
pub use keyring::{account_of, alice};
pub use network::{InboundTransfer, MockNetwork};
