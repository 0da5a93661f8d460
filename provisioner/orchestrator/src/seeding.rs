// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Registration and funding of local assets through root-origin batches.

use crate::{
	config::{SeedAssetConfig, SeedPoolConfig},
	pools::{self, PoolPair},
	Result, LOG_TARGET,
};
use xcm_provisioner_client::{
	compose, value, BlockBuildMode, BlockPacer, Call, ChainError, Keypair, RootScheduler,
	StorageQuery, Value,
};
use xcm_provisioner_primitives::{AssetId, Balance};

pub fn register_call(asset: &SeedAssetConfig) -> Call {
	Call::new(
		"AssetRegistry",
		"register",
		[
			("asset_id", value::option(Some(Value::u128(asset.id.into())))),
			("name", value::option(Some(Value::from_bytes(asset.name.as_bytes())))),
			("asset_type", Value::unnamed_variant("Token", [])),
			("existential_deposit", value::option(Some(Value::u128(asset.existential_deposit)))),
			("symbol", value::option(Some(Value::from_bytes(asset.symbol.as_bytes())))),
			("decimals", value::option(Some(Value::u128(asset.decimals.into())))),
			("location", value::option(None)),
			("xcm_rate_limit", value::option(None)),
			("is_sufficient", Value::bool(true)),
		],
	)
}

/// `MultiTransactionPayment::add_currency` with the raw `FixedU128` price.
pub fn add_currency_call(id: AssetId, price: u128) -> Call {
	Call::new(
		"MultiTransactionPayment",
		"add_currency",
		[("currency", Value::u128(id.into())), ("price", Value::u128(price))],
	)
}

pub fn set_balance_call(who: &[u8; 32], id: AssetId, free: Balance) -> Call {
	Call::new(
		"Tokens",
		"set_balance",
		[
			("who", value::multi_address(who)),
			("currency_id", Value::u128(id.into())),
			("new_free", Value::u128(free)),
			("new_reserved", Value::u128(0)),
		],
	)
}

async fn is_registered(scheduler: &RootScheduler, id: AssetId) -> Result<bool> {
	let query = StorageQuery::map("AssetRegistry", "Assets", [Value::u128(id.into())]);
	Ok(scheduler.chain().fetch(&query).await?.is_some())
}

/// What [`seed_local`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
	pub registered: Vec<AssetId>,
	/// Assets that were already registered and left untouched.
	pub skipped: Vec<AssetId>,
	pub pool_created: bool,
}

/// Register, accept as fee currency and fund every asset of `assets` with root origin, then
/// create `pool` with a signed transaction.
///
/// Each asset is dispatched in its own scheduled batch followed by a forced block. Assets already
/// known to the registry are skipped, so an interrupted run can be repeated.
pub async fn seed_local(
	pacer: &BlockPacer,
	scheduler: &RootScheduler,
	signer: &Keypair,
	native_asset_id: AssetId,
	assets: &[SeedAssetConfig],
	pool: Option<&SeedPoolConfig>,
) -> Result<SeedReport> {
	let chain = scheduler.chain().clone();
	let who = signer.public_key().0;
	pacer.set_build_mode(BlockBuildMode::Instant).await?;

	let mut report = SeedReport::default();
	for asset in assets {
		if is_registered(scheduler, asset.id).await? {
			log::info!(
				target: LOG_TARGET,
				"Asset {} is already registered on {}, skipping",
				asset.id,
				chain.name()
			);
			report.skipped.push(asset.id);
			continue
		}
		let batch = compose([
			register_call(asset),
			add_currency_call(asset.id, asset.fee_price.to_fixed_u128()?),
			set_balance_call(&who, asset.id, asset.balance()?),
		]);
		let block = scheduler.schedule(&batch).await?;
		if !is_registered(scheduler, asset.id).await? {
			return Err(ChainError::UnexpectedValue(format!(
				"registration of asset {} scheduled at #{block} on {} did not take effect",
				asset.id,
				chain.name()
			))
			.into())
		}
		log::info!(
			target: LOG_TARGET,
			"🌱 Seeded {} ({}) on {} at #{block}",
			asset.symbol,
			asset.id,
			chain.name()
		);
		report.registered.push(asset.id);
	}

	if let Some(pool) = pool {
		let pair = PoolPair {
			asset_a: pool.asset_a,
			amount_a: pool.amount_a,
			asset_b: pool.asset_b,
			amount_b: pool.amount_b,
		};
		report.pool_created =
			pools::submit_pools(&*chain, signer, native_asset_id, &[pair]).await?.is_some();
	}
	Ok(report)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Error;
	use assert_matches::assert_matches;
	use pretty_assertions::assert_eq;
	use xcm_provisioner_primitives::Price;
	use xcm_provisioner_test_utils::{account_of, alice, MockChain};

	fn seed(id: AssetId, symbol: &str) -> SeedAssetConfig {
		SeedAssetConfig {
			id,
			name: symbol.to_lowercase(),
			symbol: symbol.into(),
			decimals: 12,
			existential_deposit: 1000,
			fee_price: Price::new(1000, 18).unwrap(),
			balance_units: 100_000,
		}
	}

	#[tokio::test]
	async fn seeds_assets_and_pool() {
		let chain = MockChain::new("testnet").with_root_injection().build();
		let pacer = BlockPacer::new(chain.clone());
		let scheduler = RootScheduler::new(chain.clone()).unwrap();
		let signer = alice();
		let who = account_of(&signer);
		let amount = 100_000 * 10u128.pow(12);
		let pool =
			SeedPoolConfig { asset_a: 9999, amount_a: 1_000, asset_b: 9998, amount_b: 2_000 };

		let report = seed_local(
			&pacer,
			&scheduler,
			&signer,
			0,
			&[seed(9999, "BLAST"), seed(9998, "FAZE")],
			Some(&pool),
		)
		.await
		.unwrap();

		assert_eq!(
			report,
			SeedReport { registered: vec![9999, 9998], skipped: vec![], pool_created: true }
		);
		assert_eq!(chain.build_mode(), Some(BlockBuildMode::Instant));
		assert_eq!(chain.registry_decimals(9999), Some(12));
		assert_eq!(chain.accepted_currency(9998), Some(1000));
		assert_eq!(chain.balance(&who, 9999), amount - 1_000);
		assert_eq!(chain.pool(9999, 9998), Some((1_000, 2_000)));
		assert!(chain.scheduled_results().iter().all(|(_, result)| result.is_ok()));
	}

	#[tokio::test]
	async fn repeated_seeding_skips_registered_assets() {
		let chain = MockChain::new("testnet").with_root_injection().build();
		let pacer = BlockPacer::new(chain.clone());
		let scheduler = RootScheduler::new(chain.clone()).unwrap();
		let assets = [seed(9999, "BLAST")];

		seed_local(&pacer, &scheduler, &alice(), 0, &assets, None).await.unwrap();
		let report = seed_local(&pacer, &scheduler, &alice(), 0, &assets, None).await.unwrap();
		assert_eq!(report.skipped, vec![9999]);
		assert_eq!(chain.scheduled_results().len(), 1);
	}

	#[tokio::test]
	async fn failed_scheduled_batch_is_detected() {
		let chain = MockChain::new("testnet").with_root_injection().build();
		let pacer = BlockPacer::new(chain.clone());
		let scheduler = RootScheduler::new(chain.clone()).unwrap();
		let mut asset = seed(9999, "BLAST");
		asset.fee_price = Price::new(1, 18).unwrap();
		// Already accepted as fee currency, so the scheduled batch fails as a whole.
		chain.accept_currency(9999, 1);

		assert_matches!(
			seed_local(&pacer, &scheduler, &alice(), 0, &[asset], None).await,
			Err(Error::Chain(ChainError::UnexpectedValue(_)))
		);
		assert_eq!(chain.registry_decimals(9999), None);
	}
}
