// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Creation of fungible assets on the asset-origin chain.

use crate::{counter::Counter, Result, LOG_TARGET};
use xcm_provisioner_client::{compose, value, Call, Chain, Keypair, StorageQuery, Value};
use xcm_provisioner_primitives::{AssetDescriptor, AssetId, AssetSpec, Balance};

/// Amounts and accounts used when creating assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionParams {
	/// Minted to the signer.
	pub mint_amount: Balance,
	pub min_balance: Balance,
	/// Account given an empty balance of every asset, usually the sovereign account of a
	/// destination so that it can receive the reserve.
	pub counterpart: [u8; 32],
}

pub fn create_call(id: AssetId, admin: &[u8; 32], min_balance: Balance) -> Call {
	Call::new(
		"Assets",
		"create",
		[
			("id", Value::u128(id.into())),
			("admin", value::multi_address(admin)),
			("min_balance", Value::u128(min_balance)),
		],
	)
}

pub fn set_metadata_call(id: AssetId, spec: &AssetSpec) -> Call {
	Call::new(
		"Assets",
		"set_metadata",
		[
			("id", Value::u128(id.into())),
			("name", Value::from_bytes(spec.name.as_bytes())),
			("symbol", Value::from_bytes(spec.symbol.as_bytes())),
			("decimals", Value::u128(spec.decimals.into())),
		],
	)
}

pub fn mint_call(id: AssetId, beneficiary: &[u8; 32], amount: Balance) -> Call {
	Call::new(
		"Assets",
		"mint",
		[
			("id", Value::u128(id.into())),
			("beneficiary", value::multi_address(beneficiary)),
			("amount", Value::u128(amount)),
		],
	)
}

pub fn touch_other_call(id: AssetId, who: &[u8; 32]) -> Call {
	Call::new(
		"Assets",
		"touch_other",
		[("id", Value::u128(id.into())), ("who", value::multi_address(who))],
	)
}

/// Whether the assets pallet of `chain` knows asset `id`.
pub async fn asset_exists(chain: &dyn Chain, id: AssetId) -> Result<bool> {
	let query = StorageQuery::map("Assets", "Asset", [Value::u128(id.into())]);
	Ok(chain.fetch(&query).await?.is_some())
}

/// Create, describe and mint one asset per spec in a single atomic batch.
///
/// Identifiers are allocated contiguously from the chain's asset counter. Returns the
/// descriptors in spec order.
pub async fn provision_assets(
	chain: &dyn Chain,
	counter: &Counter,
	signer: &Keypair,
	specs: &[AssetSpec],
	params: &ProvisionParams,
) -> Result<Vec<AssetDescriptor>> {
	if specs.is_empty() {
		log::info!(target: LOG_TARGET, "No assets to create on {}", chain.name());
		return Ok(Vec::new())
	}
	let owner = signer.public_key().0;
	let lease = counter.checkout(chain, specs.len()).await?;

	let mut calls = Vec::with_capacity(specs.len() * 4);
	let mut descriptors = Vec::with_capacity(specs.len());
	for (id, spec) in lease.ids().zip(specs) {
		calls.extend([
			create_call(id, &owner, params.min_balance),
			set_metadata_call(id, spec),
			mint_call(id, &owner, params.mint_amount),
			touch_other_call(id, &params.counterpart),
		]);
		descriptors.push(AssetDescriptor::from_spec(id, spec));
	}

	log::info!(
		target: LOG_TARGET,
		"🪙 Creating {} asset(s) on {} with ids {:?}",
		specs.len(),
		chain.name(),
		lease.ids()
	);
	let outcome = chain.submit(&compose(calls), signer).await?;
	log::info!(
		target: LOG_TARGET,
		"Assets created on {} in block #{} ({:?})",
		chain.name(),
		outcome.block_number,
		outcome.block_hash
	);
	lease.settle().await?;
	Ok(descriptors)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Error;
	use assert_matches::assert_matches;
	use pretty_assertions::assert_eq;
	use xcm_provisioner_client::ChainError;
	use xcm_provisioner_primitives::{sibling_account, Price};
	use xcm_provisioner_test_utils::{account_of, alice, MockChain};

	fn spec(symbol: &str, decimals: u8) -> AssetSpec {
		AssetSpec {
			name: format!("{symbol} token"),
			symbol: symbol.into(),
			decimals,
			initial_price: Some(Price::from_integer(2)),
		}
	}

	fn params() -> ProvisionParams {
		ProvisionParams { mint_amount: 1_000, min_balance: 1, counterpart: sibling_account(2034) }
	}

	#[tokio::test]
	async fn allocates_contiguous_ids_from_counter() {
		let chain = MockChain::new("origin").with_next_asset_id(Some(42)).build();
		let signer = alice();
		let specs = [spec("AAA", 18), spec("BBB", 12), spec("CCC", 6)];

		let counter = Counter::assets();
		let descriptors =
			provision_assets(&*chain, &counter, &signer, &specs, &params()).await.unwrap();

		assert_eq!(descriptors.iter().map(|d| d.local_id).collect::<Vec<_>>(), vec![42, 43, 44]);
		assert_eq!(descriptors[1], AssetDescriptor::from_spec(43, &specs[1]));
		assert_eq!(chain.next_asset_id(), Some(45));
		assert_eq!(chain.asset_metadata(44), Some(("CCC token".into(), "CCC".into(), 6)));
		assert_eq!(chain.asset_balance(42, &account_of(&signer)), Some(1_000));
		assert_eq!(chain.asset_balance(42, &sibling_account(2034)), Some(0));
	}

	#[tokio::test]
	async fn empty_specs_submit_nothing() {
		let chain = MockChain::new("origin").with_next_asset_id(None).build();
		let descriptors =
			provision_assets(&*chain, &Counter::assets(), &alice(), &[], &params()).await.unwrap();
		assert!(descriptors.is_empty());
		assert_eq!(chain.height(), 0);
	}

	#[tokio::test]
	async fn uses_fallback_when_chain_has_no_counter() {
		let chain = MockChain::new("origin").with_next_asset_id(None).build();
		let counter = Counter::assets().with_fallback(Some(9000));
		let descriptors =
			provision_assets(&*chain, &counter, &alice(), &[spec("AAA", 10)], &params())
				.await
				.unwrap();
		assert_eq!(descriptors[0].local_id, 9000);
		assert!(chain.asset_metadata(9000).is_some());
	}

	#[tokio::test]
	async fn counter_overflow_submits_nothing() {
		let chain = MockChain::new("origin").with_next_asset_id(Some(AssetId::MAX)).build();
		let result = provision_assets(
			&*chain,
			&Counter::assets(),
			&alice(),
			&[spec("AAA", 10), spec("BBB", 10)],
			&params(),
		)
		.await;

		assert_matches!(result, Err(Error::IdentifierOverflow { count: 2, .. }));
		assert_eq!(chain.height(), 0);
		assert_eq!(chain.asset_metadata(AssetId::MAX), None);
	}

	#[tokio::test]
	async fn foreign_allocation_aborts_the_whole_batch() {
		let chain = MockChain::new("origin").with_next_asset_id(Some(1)).build();
		chain.steal_ids_before_next_submission(1);
		let result =
			provision_assets(&*chain, &Counter::assets(), &alice(), &[spec("AAA", 10)], &params())
				.await;

		assert_matches!(
			result,
			Err(Error::Chain(ChainError::DispatchFailed { error, .. })) if error == "BadAssetId"
		);
		assert_eq!(chain.asset_metadata(1), None);
		assert_eq!(chain.asset_balance(1, &account_of(&alice())), None);
	}
}
