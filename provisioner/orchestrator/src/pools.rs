// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! XYK pools on a destination chain.

use crate::{Error, Result, LOG_TARGET};
use xcm_provisioner_client::{
	compose, value, Call, Chain, Keypair, StorageQuery, TransactionOutcome, Value,
};
use xcm_provisioner_primitives::{AssetId, Balance, Price};

/// Liquidity of one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolPair {
	pub asset_a: AssetId,
	pub amount_a: Balance,
	pub asset_b: AssetId,
	pub amount_b: Balance,
}

pub fn create_pool_call(pair: &PoolPair) -> Call {
	Call::new(
		"XYK",
		"create_pool",
		[
			("asset_a", Value::u128(pair.asset_a.into())),
			("amount_a", Value::u128(pair.amount_a)),
			("asset_b", Value::u128(pair.asset_b.into())),
			("amount_b", Value::u128(pair.amount_b)),
		],
	)
}

/// Amount of the quote asset matching `base_amount` at `price`, truncated.
pub fn quote_amount(base_amount: Balance, price: &Price) -> Result<Balance> {
	Ok(price.quote_for(base_amount)?)
}

/// Pairs of `base` with every quote asset, priced by the quote's price.
pub fn plan_pools(
	base: AssetId,
	base_amount: Balance,
	quotes: &[(AssetId, Price)],
) -> Result<Vec<PoolPair>> {
	quotes
		.iter()
		.map(|(quote, price)| {
			Ok(PoolPair {
				asset_a: base,
				amount_a: base_amount,
				asset_b: *quote,
				amount_b: quote_amount(base_amount, price)?,
			})
		})
		.collect()
}

/// Free balance of `account` in `asset_id`. Balances of the native asset live in
/// `System::Account`, others in `Tokens::Accounts`.
pub async fn free_balance(
	chain: &dyn Chain,
	native_asset_id: AssetId,
	account: &[u8; 32],
	asset_id: AssetId,
) -> Result<Balance> {
	let (query, path): (_, &[&str]) = if asset_id == native_asset_id {
		let query = StorageQuery::map("System", "Account", [value::account_id(account)]);
		(query, &["data", "free"][..])
	} else {
		(
			StorageQuery::map(
				"Tokens",
				"Accounts",
				[value::account_id(account), Value::u128(asset_id.into())],
			),
			&["free"][..],
		)
	};
	let Some(info) = chain.fetch(&query).await? else { return Ok(0) };
	let mut free = &info;
	for field in path {
		free = value::field(free, field).ok_or_else(|| {
			Error::Chain(xcm_provisioner_client::ChainError::UnexpectedValue(format!(
				"{}::{} has no `{field}`",
				query.pallet, query.entry
			)))
		})?;
	}
	Ok(value::to_u128(free)?)
}

/// Create every pool of `pairs` in one batch.
///
/// The signer must hold every asset involved, otherwise nothing is submitted and
/// [`Error::InsufficientBalance`] is returned. Returns `None` if there is nothing to create.
pub async fn submit_pools(
	chain: &dyn Chain,
	signer: &Keypair,
	native_asset_id: AssetId,
	pairs: &[PoolPair],
) -> Result<Option<TransactionOutcome>> {
	if pairs.is_empty() {
		return Ok(None)
	}
	let account = signer.public_key().0;
	let mut assets: Vec<AssetId> =
		pairs.iter().flat_map(|pair| [pair.asset_a, pair.asset_b]).collect();
	assets.sort_unstable();
	assets.dedup();
	for asset_id in assets {
		if free_balance(chain, native_asset_id, &account, asset_id).await? == 0 {
			return Err(Error::InsufficientBalance {
				chain: chain.name().to_string(),
				asset_id,
				account: hex::encode(account),
			})
		}
	}

	log::info!(target: LOG_TARGET, "🏊 Creating {} pool(s) on {}", pairs.len(), chain.name());
	let outcome = chain.submit(&compose(pairs.iter().map(create_pool_call)), signer).await?;
	log::info!(
		target: LOG_TARGET,
		"Pools created on {} in block #{}",
		chain.name(),
		outcome.block_number
	);
	Ok(Some(outcome))
}

/// Create one pool between `base` and every quote asset, all in one batch.
pub async fn create_pools(
	chain: &dyn Chain,
	signer: &Keypair,
	native_asset_id: AssetId,
	base: AssetId,
	base_amount: Balance,
	quotes: &[(AssetId, Price)],
) -> Result<Option<TransactionOutcome>> {
	let pairs = plan_pools(base, base_amount, quotes)?;
	submit_pools(chain, signer, native_asset_id, &pairs).await
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_matches::assert_matches;
	use pretty_assertions::assert_eq;
	use xcm_provisioner_test_utils::{account_of, alice, MockChain};

	#[test]
	fn quote_amount_truncates() {
		assert_eq!(quote_amount(10, &"3".parse().unwrap()).unwrap(), 3);
		assert_eq!(quote_amount(1_000, &"0.001".parse().unwrap()).unwrap(), 1_000_000);
		assert_eq!(quote_amount(7, &"2.5".parse().unwrap()).unwrap(), 2);
		assert_matches!(quote_amount(7, &Price::from_integer(0)), Err(Error::Price(_)));
	}

	#[test]
	fn plan_pairs_base_with_every_quote() {
		let pairs = plan_pools(
			1,
			100,
			&[(2, Price::from_integer(1)), (3, Price::from_integer(4))],
		)
		.unwrap();
		assert_eq!(
			pairs,
			vec![
				PoolPair { asset_a: 1, amount_a: 100, asset_b: 2, amount_b: 100 },
				PoolPair { asset_a: 1, amount_a: 100, asset_b: 3, amount_b: 25 },
			]
		);
	}

	#[tokio::test]
	async fn reads_native_and_token_balances() {
		let who = account_of(&alice());
		let chain = MockChain::new("destination")
			.with_balance(who, 0, 11)
			.with_balance(who, 7, 22)
			.build();
		assert_eq!(free_balance(&*chain, 0, &who, 0).await.unwrap(), 11);
		assert_eq!(free_balance(&*chain, 0, &who, 7).await.unwrap(), 22);
		assert_eq!(free_balance(&*chain, 0, &who, 8).await.unwrap(), 0);

		// Native balances follow the chain's own native id.
		let chain = MockChain::new("destination")
			.with_native_asset_id(100)
			.with_balance(who, 100, 33)
			.build();
		assert_eq!(free_balance(&*chain, 100, &who, 100).await.unwrap(), 33);
		assert_eq!(free_balance(&*chain, 0, &who, 100).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn creates_all_pools_in_one_block() {
		let who = account_of(&alice());
		let chain = MockChain::new("destination")
			.with_balance(who, 1, 1_000)
			.with_balance(who, 2, 1_000)
			.with_balance(who, 3, 1_000)
			.build();

		let outcome = create_pools(
			&*chain,
			&alice(),
			0,
			1,
			100,
			&[(2, Price::from_integer(2)), (3, "0.5".parse().unwrap())],
		)
		.await
		.unwrap()
		.unwrap();

		assert_eq!(outcome.block_number, 1);
		assert_eq!(chain.pool(1, 2), Some((100, 50)));
		assert_eq!(chain.pool(3, 1), Some((200, 100)));
		assert_eq!(chain.balance(&who, 1), 800);
	}

	#[tokio::test]
	async fn missing_balance_submits_nothing() {
		let who = account_of(&alice());
		let chain = MockChain::new("destination").with_balance(who, 1, 1_000).build();

		let result =
			create_pools(&*chain, &alice(), 0, 1, 100, &[(2, Price::from_integer(1))]).await;
		assert_matches!(result, Err(Error::InsufficientBalance { asset_id: 2, .. }));
		assert_eq!(chain.height(), 0);
		assert_eq!(chain.pool_count(), 0);
	}

	#[tokio::test]
	async fn nothing_to_create() {
		let chain = MockChain::new("destination").build();
		assert_eq!(create_pools(&*chain, &alice(), 0, 1, 100, &[]).await.unwrap(), None);
	}
}
