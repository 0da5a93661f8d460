// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Reserve transfers of origin assets to a sibling parachain.

use crate::{Error, Result, LOG_TARGET};
use xcm_provisioner_client::{
	value, Call, Chain, ChainError, Keypair, TransactionOutcome, Value, XcmVersion,
};
use xcm_provisioner_primitives::{Asset, AssetId, Balance, Location};

/// Pallets whose dispatch errors mean the message was not sent.
const XCM_SEND_PALLETS: [&str; 3] = ["PolkadotXcm", "XcmpQueue", "Assets"];

/// Amount of one origin asset to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveTransfer {
	pub origin_asset_id: AssetId,
	pub amount: Balance,
}

/// Route of a reserve transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeRoute {
	/// Instance of the assets pallet on the origin.
	pub pallet_instance: u8,
	pub destination_para_id: u32,
	/// Receiver on the destination.
	pub beneficiary: [u8; 32],
	/// Relay native asset paying for execution on the destination.
	pub xcm_fee: Balance,
}

/// The `PolkadotXcm::limited_reserve_transfer_assets` call moving `transfer` along `route`.
///
/// The transferred asset comes first and the relay native fee asset second, which is what the
/// fee item index refers to.
pub fn reserve_transfer_call(transfer: &ReserveTransfer, route: &BridgeRoute) -> Call {
	let assets = [
		Asset::fungible(
			Location::local_asset(route.pallet_instance, transfer.origin_asset_id.into()),
			transfer.amount,
		),
		Asset::fungible(Location::parent(), route.xcm_fee),
	];
	Call::new(
		"PolkadotXcm",
		"limited_reserve_transfer_assets",
		[
			(
				"dest",
				value::versioned_location(
					&Location::sibling(route.destination_para_id),
					XcmVersion::V4,
				),
			),
			(
				"beneficiary",
				value::versioned_location(
					&Location::account_id32(None, route.beneficiary),
					XcmVersion::V4,
				),
			),
			("assets", value::versioned_assets(&assets, XcmVersion::V4)),
			("fee_asset_item", Value::u128(1)),
			("weight_limit", Value::unnamed_variant("Unlimited", [])),
		],
	)
}

/// Send `transfer` from `origin` along `route` and wait for its inclusion on the origin.
///
/// Delivery on the destination happens when the destination builds its next block.
pub async fn bridge(
	origin: &dyn Chain,
	signer: &Keypair,
	transfer: &ReserveTransfer,
	route: &BridgeRoute,
) -> Result<TransactionOutcome> {
	log::info!(
		target: LOG_TARGET,
		"🌉 Sending {} of asset {} from {} to para {}",
		transfer.amount,
		transfer.origin_asset_id,
		origin.name(),
		route.destination_para_id
	);
	let call = reserve_transfer_call(transfer, route);
	let outcome = origin.submit(&call.into(), signer).await.map_err(|err| match err {
		ChainError::DispatchFailed { chain, pallet, error }
			if XCM_SEND_PALLETS.contains(&pallet.as_str()) =>
		{
			Error::XcmSendRejected { chain, asset_id: transfer.origin_asset_id, pallet, error }
		},
		err => err.into(),
	})?;
	if outcome.find_event("PolkadotXcm", "Sent").is_none() {
		log::warn!(
			target: LOG_TARGET,
			"No XCM message reported sent for asset {} in block #{} of {}",
			transfer.origin_asset_id,
			outcome.block_number,
			origin.name()
		);
	}
	Ok(outcome)
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_matches::assert_matches;
	use pretty_assertions::assert_eq;
	use xcm_provisioner_client::{compose, ControlCommand};
	use xcm_provisioner_primitives::sibling_account;
	use xcm_provisioner_test_utils::{account_of, alice, MockChain, MockNetwork};

	fn route(beneficiary: [u8; 32]) -> BridgeRoute {
		BridgeRoute { pallet_instance: 50, destination_para_id: 2034, beneficiary, xcm_fee: 1_000 }
	}

	#[test]
	fn call_shape_matches_reserve_transfer() {
		let call = reserve_transfer_call(
			&ReserveTransfer { origin_asset_id: 3, amount: 10 },
			&route([1; 32]),
		);
		assert!(call.is("PolkadotXcm", "limited_reserve_transfer_assets"));
		assert_eq!(
			value::to_location(call.field("dest").unwrap()).unwrap(),
			Location::sibling(2034)
		);
		assert_eq!(
			value::to_assets(call.field("assets").unwrap()).unwrap(),
			vec![
				Asset::fungible(Location::local_asset(50, 3), 10),
				Asset::fungible(Location::parent(), 1_000),
			]
		);
		assert_eq!(value::to_u32(call.field("fee_asset_item").unwrap()).unwrap(), 1);
	}

	#[tokio::test]
	async fn delivered_on_next_destination_block() {
		let network = MockNetwork::new();
		let origin = MockChain::new("origin").with_para_id(1000, &network).build();
		let destination = MockChain::new("destination").with_para_id(2034, &network).build();
		let signer = alice();
		let who = account_of(&signer);

		origin
			.submit(
				&compose([
					crate::provisioning::create_call(1, &who, 1),
					crate::provisioning::mint_call(1, &who, 500),
				]),
				&signer,
			)
			.await
			.unwrap();
		let id = destination.register_location(Location::sibling_asset(1000, 50, 1));

		let outcome = bridge(
			&*origin,
			&signer,
			&ReserveTransfer { origin_asset_id: 1, amount: 100 },
			&route(who),
		)
		.await
		.unwrap();
		assert!(outcome.find_event("PolkadotXcm", "Sent").is_some());
		assert_eq!(destination.balance(&who, id), 0);
		assert_eq!(origin.asset_balance(1, &sibling_account(2034)), Some(100));

		destination.control(ControlCommand::NewBlock { count: 1 }).await.unwrap();
		assert_eq!(destination.balance(&who, id), 100);
	}

	#[tokio::test]
	async fn send_failure_is_reported_per_asset() {
		let network = MockNetwork::new();
		let origin = MockChain::new("origin").with_para_id(1000, &network).build();
		let result = bridge(
			&*origin,
			&alice(),
			&ReserveTransfer { origin_asset_id: 9, amount: 1 },
			&route([0; 32]),
		)
		.await;
		assert_matches!(
			result,
			Err(Error::XcmSendRejected { asset_id: 9, pallet, .. }) if pallet == "PolkadotXcm"
		);
		assert_eq!(network.pending(2034), 0);
	}
}
