// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Leases on a chain's "next identifier" counter.
//!
//! Identifiers are predicted from the counter before a batch is submitted. A [`CounterLease`]
//! keeps other tasks of this process from using the same counter until it is settled, and
//! settling re-reads the counter to detect identifiers consumed by anyone else.

use crate::{Error, Result, LOG_TARGET};
use tokio::sync::{Mutex, MutexGuard};
use xcm_provisioner_client::{value, Chain, StorageQuery};
use xcm_provisioner_primitives::AssetId;

/// A storage value holding the next identifier a chain allocates.
pub struct Counter {
	pallet: &'static str,
	entry: &'static str,
	fallback: Option<AssetId>,
	lock: Mutex<()>,
}

impl Counter {
	pub fn new(pallet: &'static str, entry: &'static str) -> Self {
		Self { pallet, entry, fallback: None, lock: Mutex::new(()) }
	}

	/// `Assets::NextAssetId` of an asset-origin chain.
	pub fn assets() -> Self {
		Self::new("Assets", "NextAssetId")
	}

	/// `AssetRegistry::NextAssetId` of a destination chain.
	pub fn asset_registry() -> Self {
		Self::new("AssetRegistry", "NextAssetId")
	}

	/// Value used when the chain does not expose the counter.
	pub fn with_fallback(mut self, fallback: Option<AssetId>) -> Self {
		self.fallback = fallback;
		self
	}

	fn describe(&self) -> String {
		format!("{}::{}", self.pallet, self.entry)
	}

	/// Current value of the counter, `None` if the chain does not expose it.
	pub async fn read(&self, chain: &dyn Chain) -> Result<Option<AssetId>> {
		let query = StorageQuery::plain(self.pallet, self.entry);
		Ok(chain.fetch(&query).await?.map(|value| value::to_u32(&value)).transpose()?)
	}

	/// Reserve `count` identifiers starting at the current value of the counter.
	///
	/// Fails with [`Error::IdentifierOverflow`] if the identifiers do not fit in an [`AssetId`].
	pub async fn checkout<'a>(
		&'a self,
		chain: &'a dyn Chain,
		count: usize,
	) -> Result<CounterLease<'a>> {
		let guard = self.lock.lock().await;
		let (start, observed) = match self.read(chain).await? {
			Some(start) => (start, true),
			None => {
				let start = self.fallback.ok_or_else(|| Error::MissingCounter {
					chain: chain.name().to_string(),
					counter: self.describe(),
				})?;
				log::debug!(
					target: LOG_TARGET,
					"{} exposes no {}, starting at configured id {start}",
					chain.name(),
					self.describe()
				);
				(start, false)
			},
		};
		let end = AssetId::try_from(count)
			.ok()
			.and_then(|count| start.checked_add(count))
			.ok_or_else(|| Error::IdentifierOverflow {
				chain: chain.name().to_string(),
				counter: self.describe(),
				start,
				count,
			})?;
		Ok(CounterLease { counter: self, chain, start, end, observed, _guard: guard })
	}
}

/// Exclusive use of `count` identifiers of a [`Counter`] for one batch.
pub struct CounterLease<'a> {
	counter: &'a Counter,
	chain: &'a dyn Chain,
	start: AssetId,
	end: AssetId,
	observed: bool,
	_guard: MutexGuard<'a, ()>,
}

impl CounterLease<'_> {
	/// First identifier of the lease.
	pub fn start(&self) -> AssetId {
		self.start
	}

	/// Identifiers predicted for the items of the batch, in order.
	pub fn ids(&self) -> std::ops::Range<AssetId> {
		self.start..self.end
	}

	/// Re-read the counter after the batch was included. It must have advanced by exactly the
	/// leased identifiers.
	pub async fn settle(self) -> Result<()> {
		if !self.observed {
			return Ok(())
		}
		let expected = self.end;
		let found = self.counter.read(self.chain).await?;
		if found != Some(expected) {
			return Err(Error::IdentifierPredictionMismatch {
				chain: self.chain.name().to_string(),
				counter: self.counter.describe(),
				expected,
				found,
			})
		}
		Ok(())
	}
}
