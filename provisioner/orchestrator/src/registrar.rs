// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Registration of origin assets on a destination chain's asset registry.
//!
//! The destination allocates sequential ids for external registrations. The id of every asset is
//! predicted from `AssetRegistry::NextAssetId` before submission and then replaced by what
//! `AssetRegistry::LocationAssets` reports once the batch is included.

use crate::{counter::Counter, store::MetadataStore, Error, Result, LOG_TARGET};
use xcm_provisioner_client::{compose, value, Call, Chain, Keypair, StorageQuery, XcmVersion};
use xcm_provisioner_primitives::{AssetDescriptor, AssetId, CrossChainAssetRecord, Location};

pub fn register_external_call(location: &Location) -> Call {
	Call::new(
		"AssetRegistry",
		"register_external",
		[("location", value::location(location, XcmVersion::V3))],
	)
}

/// Registry id of `location` on `chain`, if registered.
pub async fn registered_id(chain: &dyn Chain, location: &Location) -> Result<Option<AssetId>> {
	let query = StorageQuery::map(
		"AssetRegistry",
		"LocationAssets",
		[value::location(location, XcmVersion::V3)],
	);
	Ok(chain.fetch(&query).await?.map(|id| value::to_u32(&id)).transpose()?)
}

/// Registers origin assets on one destination.
pub struct Registrar<'a> {
	pub chain: &'a dyn Chain,
	pub counter: &'a Counter,
	/// Added to the registry counter to obtain sequential ids.
	pub id_offset: AssetId,
	/// Where the records are persisted.
	pub store: &'a MetadataStore,
}

fn record(
	asset: &AssetDescriptor,
	location: Location,
	destination_local_id: AssetId,
) -> CrossChainAssetRecord {
	CrossChainAssetRecord {
		destination_local_id,
		origin_asset_id: asset.local_id,
		name: asset.name.clone(),
		symbol: asset.symbol.clone(),
		decimals: asset.decimals,
		location,
		initial_price: asset.initial_price,
	}
}

fn locations(
	origin_para_id: u32,
	pallet_instance: u8,
	assets: &[AssetDescriptor],
) -> Vec<Location> {
	assets
		.iter()
		.map(|asset| {
			Location::sibling_asset(origin_para_id, pallet_instance, asset.local_id.into())
		})
		.collect()
}

impl Registrar<'_> {
	/// Records of `assets` if the destination already knows every one of them, as left by an
	/// earlier registration whose inclusion was not observed. The records are written to the
	/// store. Returns `None` if any asset is not registered.
	pub async fn recover_registered(
		&self,
		origin_para_id: u32,
		pallet_instance: u8,
		assets: &[AssetDescriptor],
	) -> Result<Option<Vec<CrossChainAssetRecord>>> {
		let locations = locations(origin_para_id, pallet_instance, assets);
		let mut records = Vec::with_capacity(assets.len());
		for (asset, location) in assets.iter().zip(locations) {
			let Some(id) = registered_id(self.chain, &location).await? else { return Ok(None) };
			records.push(record(asset, location, id));
		}
		log::info!(
			target: LOG_TARGET,
			"♻️ Recovered {} registration(s) of para {origin_para_id} on {}",
			records.len(),
			self.chain.name()
		);
		self.store.save_new(&records)?;
		Ok(Some(records))
	}

	/// Register every asset of `assets`, created on `origin_para_id` by the assets pallet at
	/// `pallet_instance`, in one batch.
	///
	/// Fails with [`Error::AlreadyRegistered`] before submitting anything if one of the locations
	/// is already known to the destination. The records are written to the store before they are
	/// returned, an empty set of assets included.
	pub async fn register_external(
		&self,
		signer: &Keypair,
		origin_para_id: u32,
		pallet_instance: u8,
		assets: &[AssetDescriptor],
	) -> Result<Vec<CrossChainAssetRecord>> {
		let chain = self.chain;
		let locations = locations(origin_para_id, pallet_instance, assets);

		for location in &locations {
			if let Some(asset_id) = registered_id(chain, location).await? {
				return Err(Error::AlreadyRegistered {
					chain: chain.name().to_string(),
					location: location.clone(),
					asset_id,
				})
			}
		}
		if assets.is_empty() {
			log::info!(target: LOG_TARGET, "No assets to register on {}", chain.name());
			self.store.save_new(&[] as &[CrossChainAssetRecord])?;
			return Ok(Vec::new())
		}

		let lease = self.counter.checkout(chain, assets.len()).await?;
		let predicted = lease
			.ids()
			.map(|id| self.id_offset.checked_add(id))
			.collect::<Option<Vec<AssetId>>>()
			.ok_or_else(|| Error::IdentifierOverflow {
				chain: chain.name().to_string(),
				counter: format!("AssetRegistry::NextAssetId + {}", self.id_offset),
				start: lease.start(),
				count: assets.len(),
			})?;
		log::info!(
			target: LOG_TARGET,
			"🔗 Registering {} asset(s) of para {origin_para_id} on {}, expecting {predicted:?}",
			assets.len(),
			chain.name()
		);
		let outcome =
			chain.submit(&compose(locations.iter().map(register_external_call)), signer).await?;
		log::info!(
			target: LOG_TARGET,
			"Registration included on {} in block #{}",
			chain.name(),
			outcome.block_number
		);

		let mut records = Vec::with_capacity(assets.len());
		for ((asset, location), predicted) in assets.iter().zip(locations).zip(predicted) {
			let destination_local_id = registered_id(chain, &location).await?.ok_or_else(|| {
				Error::IdentifierPredictionMismatch {
					chain: chain.name().to_string(),
					counter: "AssetRegistry::LocationAssets".into(),
					expected: predicted,
					found: None,
				}
			})?;
			if destination_local_id != predicted {
				log::warn!(
					target: LOG_TARGET,
					"{location} registered on {} as {destination_local_id}, predicted {predicted}",
					chain.name()
				);
			}
			records.push(record(asset, location, destination_local_id));
		}
		if let Err(err) = lease.settle().await {
			log::warn!(target: LOG_TARGET, "{err}");
		}

		self.store.save_new(&records)?;
		Ok(records)
	}
}
