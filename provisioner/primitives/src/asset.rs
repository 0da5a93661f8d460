// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Descriptors of provisioned assets and their cross-chain references.

use crate::{location::Location, price::Price};
use serde::{Deserialize, Serialize};

/// Identifier of an asset local to one chain.
pub type AssetId = u32;

/// Balance type shared by every chain the provisioner drives.
pub type Balance = u128;

/// An asset to be created on the origin chain, as listed in the assets input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSpec {
	pub name: String,
	pub symbol: String,
	pub decimals: u8,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub initial_price: Option<Price>,
}

/// An asset created on the origin chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDescriptor {
	/// Identifier allocated by the origin chain's asset counter.
	#[serde(alias = "assetId")]
	pub local_id: AssetId,
	pub name: String,
	pub symbol: String,
	pub decimals: u8,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub initial_price: Option<Price>,
}

impl AssetDescriptor {
	/// Descriptor of the asset created from `spec` under `local_id`.
	pub fn from_spec(local_id: AssetId, spec: &AssetSpec) -> Self {
		Self {
			local_id,
			name: spec.name.clone(),
			symbol: spec.symbol.clone(),
			decimals: spec.decimals,
			initial_price: spec.initial_price,
		}
	}
}

/// The registration of an origin asset on a destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossChainAssetRecord {
	/// Identifier of the asset on the destination chain.
	#[serde(alias = "assetId")]
	pub destination_local_id: AssetId,
	/// Identifier of the asset on the origin chain.
	#[serde(alias = "assetHubAssetId")]
	pub origin_asset_id: AssetId,
	pub name: String,
	pub symbol: String,
	pub decimals: u8,
	/// Location of the asset as seen from the destination chain.
	pub location: Location,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub initial_price: Option<Price>,
}

/// Serde helpers for balances written either as JSON numbers or as decimal strings, optionally
/// with `_` separators (`"1_100_000_000_000_000_000_000"`).
pub mod balance {
	use super::Balance;
	use serde::{
		de::{Error, Visitor},
		Deserializer, Serializer,
	};
	use std::fmt;

	/// Parse a balance written as a decimal string with optional `_` separators.
	pub fn parse(text: &str) -> Result<Balance, String> {
		let digits = text.trim().replace('_', "");
		if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
			return Err(format!("invalid balance `{text}`"))
		}
		digits.parse().map_err(|_| format!("balance `{text}` does not fit in u128"))
	}

	pub fn serialize<S: Serializer>(value: &Balance, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(value)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Balance, D::Error> {
		deserializer.deserialize_any(BalanceVisitor)
	}

	struct BalanceVisitor;

	impl<'de> Visitor<'de> for BalanceVisitor {
		type Value = Balance;

		fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
			f.write_str("a non-negative integer or a decimal string")
		}

		fn visit_u64<E: Error>(self, value: u64) -> Result<Balance, E> {
			Ok(value.into())
		}

		fn visit_u128<E: Error>(self, value: u128) -> Result<Balance, E> {
			Ok(value)
		}

		fn visit_i64<E: Error>(self, value: i64) -> Result<Balance, E> {
			u64::try_from(value)
				.map(Into::into)
				.map_err(|_| E::custom(format!("negative balance {value}")))
		}

		fn visit_str<E: Error>(self, value: &str) -> Result<Balance, E> {
			parse(value).map_err(E::custom)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Amount(#[serde(with = "balance")] Balance);

	#[test]
	fn asset_specs_parse_from_input_file() {
		let json = r#"[
			{ "name": "BLAST-1", "symbol": "BLAST-1", "decimals": 18, "initialPrice": 0.001 },
			{ "name": "FAZE-1", "symbol": "FAZE-1", "decimals": 12 }
		]"#;
		let specs: Vec<AssetSpec> = serde_json::from_str(json).unwrap();
		assert_eq!(specs.len(), 2);
		assert_eq!(specs[0].initial_price, Some(Price::new(1, 3).unwrap()));
		assert_eq!(specs[1].initial_price, None);
		assert_eq!(specs[1].decimals, 12);
	}

	#[test]
	fn records_accept_legacy_field_names() {
		let json = r#"{
			"assetId": 1000021,
			"assetHubAssetId": 1984,
			"name": "BLAST-1",
			"symbol": "BLAST-1",
			"decimals": 18,
			"location": {
				"parents": 1,
				"interior": { "X3": [{ "Parachain": 1000 }, { "PalletInstance": 50 }, { "GeneralIndex": 1984 }] }
			}
		}"#;
		let record: CrossChainAssetRecord = serde_json::from_str(json).unwrap();
		assert_eq!(record.destination_local_id, 1_000_021);
		assert_eq!(record.origin_asset_id, 1984);
		assert_eq!(record.location, Location::sibling_asset(1000, 50, 1984));

		let written = serde_json::to_value(&record).unwrap();
		assert_eq!(written["destinationLocalId"], 1_000_021);
		assert_eq!(written["originAssetId"], 1984);
		assert!(written.get("initialPrice").is_none());
	}

	#[test]
	fn balances_accept_numbers_and_separated_strings() {
		let amount: Amount = serde_json::from_str("\"1_100_000_000_000_000_000_000\"").unwrap();
		assert_eq!(amount.0, 1_100_000_000_000_000_000_000);
		assert_eq!(serde_json::from_str::<Amount>("1000").unwrap().0, 1000);
		assert!(serde_json::from_str::<Amount>("-1").is_err());
		assert!(serde_json::from_str::<Amount>("\"12a\"").is_err());
		assert_eq!(serde_json::to_string(&Amount(5)).unwrap(), "\"5\"");
	}
}
