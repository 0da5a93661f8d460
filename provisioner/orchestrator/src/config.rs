// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file of the provisioner.
//!
//! Every field except the origin endpoint has a default matching a local chopsticks setup of
//! Asset Hub (para 1000) and Hydration (para 2034). Balances are accepted as JSON numbers or as
//! decimal strings with optional `_` separators.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{
	path::{Path, PathBuf},
	str::FromStr,
};
use subxt_signer::SecretUri;
use xcm_provisioner_client::{AccountId32, ChainEndpoint, Keypair};
use xcm_provisioner_primitives::{asset::balance, sibling_account, AssetId, Balance, Price};

/// Asset Hub's para id.
pub const DEFAULT_ORIGIN_PARA_ID: u32 = 1000;

/// Instance index of `pallet-assets` on Asset Hub.
pub const DEFAULT_ASSETS_PALLET_INSTANCE: u8 = 50;

/// Offset of sequentially allocated asset registry ids on Hydration.
pub const DEFAULT_ASSET_ID_OFFSET: AssetId = 1_000_000;

const UNIT: Balance = 1_000_000_000_000;

fn default_signer() -> String {
	"//Alice".into()
}

fn default_origin_para_id() -> u32 {
	DEFAULT_ORIGIN_PARA_ID
}

fn default_pallet_instance() -> u8 {
	DEFAULT_ASSETS_PALLET_INSTANCE
}

fn default_asset_id_offset() -> AssetId {
	DEFAULT_ASSET_ID_OFFSET
}

fn default_assets_file() -> PathBuf {
	"assets.json".into()
}

fn default_provisioned_file() -> PathBuf {
	"provisioned-assets.json".into()
}

fn default_decimals() -> u8 {
	12
}

fn default_existential_deposit() -> Balance {
	1000
}

fn default_balance_units() -> Balance {
	100_000
}

fn default_fee_price() -> Price {
	// Raw `FixedU128` value 1000.
	Price::new(1000, 18).unwrap_or_else(|_| Price::from_integer(1))
}

fn default_price() -> Price {
	Price::from_integer(1)
}

fn default_anchor_asset_id() -> AssetId {
	5
}

fn default_anchor_amount() -> Balance {
	100 * 10u128.pow(10)
}

fn default_anchor_price() -> Price {
	Price::new(1, 3).unwrap_or_else(|_| Price::from_integer(1))
}

fn default_base_amount() -> Balance {
	1000 * UNIT
}

/// The chain the assets are created on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginConfig {
	#[serde(flatten)]
	pub endpoint: ChainEndpoint,
	#[serde(default = "default_origin_para_id")]
	pub para_id: u32,
	/// Instance index of the assets pallet, used in asset locations.
	#[serde(default = "default_pallet_instance")]
	pub assets_pallet_instance: u8,
	/// First asset id, used when the chain does not expose `Assets::NextAssetId`.
	#[serde(default)]
	pub first_asset_id: Option<AssetId>,
}

/// A chain the assets are registered on and bridged to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationConfig {
	#[serde(flatten)]
	pub endpoint: ChainEndpoint,
	pub para_id: u32,
	/// File the registration records of this destination are written to.
	pub metadata_file: PathBuf,
	#[serde(default = "default_asset_id_offset")]
	pub asset_id_offset: AssetId,
	/// Registry id of the chain's native asset, whose balances live in `System::Account`.
	#[serde(default)]
	pub native_asset_id: AssetId,
	/// Receiver of bridged liquidity (SS58 or hex). Defaults to the signer.
	#[serde(default)]
	pub beneficiary: Option<String>,
	#[serde(default)]
	pub pools: Option<PoolsConfig>,
}

/// Pools created on a destination from its registration records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolsConfig {
	/// Pool between an existing asset and the first registered asset, created first.
	#[serde(default)]
	pub anchor: Option<AnchorPoolConfig>,
	/// Amount of the first registered asset put in every other pool.
	#[serde(with = "balance", default = "default_base_amount")]
	pub base_amount: Balance,
	/// Price used for assets without an initial price.
	#[serde(default = "default_price")]
	pub default_price: Price,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorPoolConfig {
	#[serde(default = "default_anchor_asset_id")]
	pub asset_id: AssetId,
	#[serde(with = "balance", default = "default_anchor_amount")]
	pub amount: Balance,
	/// Price of one unit of the first registered asset in `asset_id`.
	#[serde(default = "default_anchor_price")]
	pub price: Price,
}

impl Default for AnchorPoolConfig {
	fn default() -> Self {
		Self {
			asset_id: default_anchor_asset_id(),
			amount: default_anchor_amount(),
			price: default_anchor_price(),
		}
	}
}

/// Raw amounts used by the provisioning phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Amounts {
	/// Minted to the signer for every created asset.
	#[serde(with = "balance")]
	pub mint: Balance,
	/// Bridged to every destination for every asset.
	#[serde(with = "balance")]
	pub transfer: Balance,
	/// Relay native asset paying for the execution of the reserve transfer.
	#[serde(with = "balance")]
	pub xcm_fee: Balance,
	/// Minimum balance of created assets.
	#[serde(with = "balance")]
	pub min_balance: Balance,
}

impl Default for Amounts {
	fn default() -> Self {
		Self {
			mint: 1_100_000_000 * UNIT,
			transfer: 1_000_000_000 * UNIT,
			xcm_fee: 1_000_000_000,
			min_balance: 1000,
		}
	}
}

/// An asset registered and funded directly on the seeded chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedAssetConfig {
	pub id: AssetId,
	pub name: String,
	pub symbol: String,
	#[serde(default = "default_decimals")]
	pub decimals: u8,
	#[serde(with = "balance", default = "default_existential_deposit")]
	pub existential_deposit: Balance,
	/// Price of the asset when paying transaction fees.
	#[serde(default = "default_fee_price")]
	pub fee_price: Price,
	/// Balance set for the signer, in whole units.
	#[serde(with = "balance", default = "default_balance_units")]
	pub balance_units: Balance,
}

impl SeedAssetConfig {
	/// Raw balance set for the signer.
	pub fn balance(&self) -> Result<Balance> {
		10u128
			.checked_pow(self.decimals.into())
			.and_then(|unit| unit.checked_mul(self.balance_units))
			.ok_or_else(|| Error::Config(format!("balance of seed asset {} overflows", self.id)))
	}
}

/// A pool created between two seeded assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedPoolConfig {
	pub asset_a: AssetId,
	#[serde(with = "balance")]
	pub amount_a: Balance,
	pub asset_b: AssetId,
	#[serde(with = "balance")]
	pub amount_b: Balance,
}

/// Registration and funding of local assets on a single chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedConfig {
	#[serde(flatten)]
	pub endpoint: ChainEndpoint,
	#[serde(default)]
	pub native_asset_id: AssetId,
	pub assets: Vec<SeedAssetConfig>,
	#[serde(default)]
	pub pool: Option<SeedPoolConfig>,
}

/// The provisioner configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
	/// Secret URI of the account signing every transaction.
	#[serde(default = "default_signer")]
	pub signer: String,
	pub origin: OriginConfig,
	/// Relay chain, only advanced between cross-chain steps.
	#[serde(default)]
	pub relay: Option<ChainEndpoint>,
	#[serde(default)]
	pub destinations: Vec<DestinationConfig>,
	/// Input list of the assets to create.
	#[serde(default = "default_assets_file")]
	pub assets_file: PathBuf,
	/// Output list of the created assets.
	#[serde(default = "default_provisioned_file")]
	pub provisioned_file: PathBuf,
	#[serde(default)]
	pub amounts: Amounts,
	/// Account touched on the origin for every created asset. Defaults to the sovereign account
	/// of the first destination.
	#[serde(default)]
	pub counterpart_account: Option<String>,
	#[serde(default)]
	pub seed: Option<SeedConfig>,
}

impl Config {
	/// Read and validate the configuration at `path`.
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)
			.map_err(|err| Error::Config(format!("cannot read {}: {err}", path.display())))?;
		let config: Self = serde_json::from_str(&content)
			.map_err(|err| Error::Config(format!("{}: {err}", path.display())))?;
		config.validate()?;
		Ok(config)
	}

	/// Check constraints serde cannot express.
	pub fn validate(&self) -> Result<()> {
		let mut para_ids = vec![self.origin.para_id];
		for destination in &self.destinations {
			if para_ids.contains(&destination.para_id) {
				return Err(Error::Config(format!(
					"para id {} is used by more than one chain",
					destination.para_id
				)))
			}
			para_ids.push(destination.para_id);
		}
		let mut files: Vec<&Path> =
			self.destinations.iter().map(|d| d.metadata_file.as_path()).collect();
		files.sort();
		if files.windows(2).any(|pair| pair[0] == pair[1]) {
			return Err(Error::Config("destinations must use distinct metadata files".into()))
		}
		if let Some(seed) = &self.seed {
			for asset in &seed.assets {
				asset.balance()?;
			}
		}
		Ok(())
	}

	/// The signing keypair.
	pub fn signer(&self) -> Result<Keypair> {
		let uri = SecretUri::from_str(&self.signer)
			.map_err(|err| Error::Config(format!("invalid signer: {err}")))?;
		Keypair::from_uri(&uri).map_err(|err| Error::Config(format!("invalid signer: {err}")))
	}

	/// Account touched on the origin for every created asset.
	pub fn counterpart(&self) -> Result<Option<[u8; 32]>> {
		match &self.counterpart_account {
			Some(account) => parse_account(account).map(Some),
			None => {
				let first = self.destinations.first();
				Ok(first.map(|destination| sibling_account(destination.para_id)))
			},
		}
	}
}

/// Parse an SS58 address or a `0x` prefixed hex account id.
pub fn parse_account(text: &str) -> Result<[u8; 32]> {
	let invalid = || Error::InvalidAccount(text.to_string());
	match text.strip_prefix("0x") {
		Some(raw) => hex::decode(raw).map_err(|_| invalid())?.try_into().map_err(|_| invalid()),
		None => AccountId32::from_str(text).map(|account| account.0).map_err(|_| invalid()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_matches::assert_matches;
	use pretty_assertions::assert_eq;
	use xcm_provisioner_client::PacerConfig;

	const MINIMAL: &str = r#"{
		"origin": { "name": "asset-hub", "url": "ws://localhost:8001" },
		"destinations": [
			{
				"name": "hydration",
				"url": "ws://localhost:8000",
				"para_id": 2034,
				"metadata_file": "asset-metadata.json"
			}
		]
	}"#;

	#[test]
	fn minimal_config_uses_defaults() {
		let config: Config = serde_json::from_str(MINIMAL).unwrap();
		config.validate().unwrap();

		assert_eq!(config.signer, "//Alice");
		assert_eq!(config.origin.para_id, 1000);
		assert_eq!(config.origin.assets_pallet_instance, 50);
		assert_eq!(config.origin.endpoint.pacer, PacerConfig::default());
		assert_eq!(config.destinations[0].asset_id_offset, 1_000_000);
		assert_eq!(config.amounts.mint, 1_100_000_000_000_000_000_000);
		assert_eq!(config.amounts.transfer, 1_000_000_000_000_000_000_000);
		assert_eq!(config.assets_file, PathBuf::from("assets.json"));
		assert_eq!(config.counterpart().unwrap(), Some(sibling_account(2034)));
	}

	#[test]
	fn demo_config_is_valid() {
		let config: Config =
			serde_json::from_str(include_str!("../../../demos/provisioner.json")).unwrap();
		config.validate().unwrap();
		assert_eq!(config.relay.unwrap().pacer, PacerConfig::Manual);
		assert_eq!(config.destinations[0].pools.as_ref().unwrap().base_amount, 1000 * UNIT);
		let seed = config.seed.unwrap();
		assert!(seed.endpoint.allow_root_injection);
		assert_eq!(seed.assets.len(), 2);
	}

	#[test]
	fn amounts_accept_numbers_and_strings() {
		let amounts: Amounts =
			serde_json::from_str(r#"{ "mint": "1_000", "transfer": 7, "xcm_fee": "0" }"#).unwrap();
		assert_eq!(amounts.mint, 1000);
		assert_eq!(amounts.transfer, 7);
		assert_eq!(amounts.xcm_fee, 0);
		assert_eq!(amounts.min_balance, 1000);
	}

	#[test]
	fn pools_and_pacer_sections_parse() {
		let destination: DestinationConfig = serde_json::from_str(
			r#"{
				"name": "hydration",
				"url": "ws://localhost:8000",
				"pacer": { "mode": "manual" },
				"para_id": 2034,
				"metadata_file": "hydration.json",
				"pools": { "anchor": {}, "base_amount": "10", "default_price": 2 }
			}"#,
		)
		.unwrap();
		assert_eq!(destination.endpoint.pacer, PacerConfig::Manual);
		let pools = destination.pools.unwrap();
		assert_eq!(pools.anchor, Some(AnchorPoolConfig::default()));
		assert_eq!(pools.anchor.unwrap().price.to_string(), "0.001");
		assert_eq!(pools.base_amount, 10);
		assert_eq!(pools.default_price, Price::from_integer(2));
	}

	#[test]
	fn rejects_duplicate_para_ids() {
		let mut config: Config = serde_json::from_str(MINIMAL).unwrap();
		let mut second = config.destinations[0].clone();
		second.metadata_file = "other.json".into();
		config.destinations.push(second);
		assert_matches!(config.validate(), Err(Error::Config(_)));
	}

	#[test]
	fn seed_balance_is_scaled_by_decimals() {
		let asset: SeedAssetConfig =
			serde_json::from_str(r#"{ "id": 9999, "name": "Blast", "symbol": "BLAST" }"#).unwrap();
		assert_eq!(asset.balance().unwrap(), 100_000 * 10u128.pow(12));
		assert_eq!(asset.fee_price.to_fixed_u128().unwrap(), 1000);
	}

	#[test]
	fn parses_accounts() {
		let alice = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
		let id = parse_account(alice).unwrap();
		assert_eq!(&id[..4], &[0xd4, 0x35, 0x93, 0xc7]);
		assert_eq!(parse_account(&format!("0x{}", hex::encode(id))).unwrap(), id);
		assert_matches!(parse_account("0x1234"), Err(Error::InvalidAccount(_)));
		assert_matches!(parse_account("not an address"), Err(Error::InvalidAccount(_)));
	}

	#[test]
	fn signer_from_dev_uri() {
		let config: Config = serde_json::from_str(MINIMAL).unwrap();
		let signer = config.signer().unwrap();
		assert_eq!(signer.public_key().0, subxt_signer::sr25519::dev::alice().public_key().0);
	}
}
