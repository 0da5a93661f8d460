// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Message passing between mock parachains.

use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};
use xcm_provisioner_primitives::{Asset, Location};

/// A reserve transfer sent by one parachain and not yet processed by the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundTransfer {
	pub origin_para_id: u32,
	/// Beneficiary as seen from the receiver.
	pub beneficiary: Location,
	/// Assets as seen from the sender.
	pub assets: Vec<Asset>,
}

/// Queues of messages per receiving parachain. A message is processed when the receiver builds
/// its next block.
#[derive(Default)]
pub struct MockNetwork {
	queues: Mutex<BTreeMap<u32, Vec<InboundTransfer>>>,
}

impl MockNetwork {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub(crate) fn send(&self, destination: u32, transfer: InboundTransfer) {
		self.queues.lock().entry(destination).or_default().push(transfer);
	}

	pub(crate) fn take(&self, para_id: u32) -> Vec<InboundTransfer> {
		self.queues.lock().remove(&para_id).unwrap_or_default()
	}

	/// Number of messages waiting for `para_id`.
	pub fn pending(&self, para_id: u32) -> usize {
		self.queues.lock().get(&para_id).map_or(0, Vec::len)
	}
}
