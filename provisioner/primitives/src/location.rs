// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Chain-relative locations.
//!
//! A [`Location`] is a path that first walks `parents` hops up the consensus hierarchy and then
//! descends through the `interior` junctions. The SCALE encoding of the types in this module is
//! byte-compatible with XCM v3/v4 for the subset of junctions the provisioner needs:
//!
//! - `Parachain` (variant `0`, compact `u32`)
//! - `AccountId32` (variant `1`)
//! - `PalletInstance` (variant `4`)
//! - `GeneralIndex` (variant `5`, compact `u128`)
//!
//! `Junctions` encodes as the `Here`/`X1`..`X8` enum, i.e. the variant index equals the number of
//! junctions that follow.

use codec::{Decode, Encode, Error as CodecError, Input, Output};
use serde::{
	de::{Error as DeError, MapAccess, Visitor},
	ser::{SerializeMap, Serializer},
	Deserialize, Deserializer, Serialize,
};
use std::fmt;

/// Maximal number of junctions in an interior location.
pub const MAX_JUNCTIONS: usize = 8;

const HERE: &str = "Here";

/// Error returned when building an invalid location.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
	/// More than [`MAX_JUNCTIONS`] junctions were supplied.
	#[error("location interior holds {0} junctions, at most {MAX_JUNCTIONS} are allowed")]
	TooManyJunctions(usize),
	/// The location is not expressed relative to the chain that was expected.
	#[error("location {0} cannot be reanchored")]
	CannotReanchor(Location),
}

/// A global identifier of a consensus system.
#[derive(
	Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Encode, Decode, Serialize, Deserialize,
)]
pub enum NetworkId {
	/// Network specified by the first 32 bytes of its genesis block.
	#[codec(index = 0)]
	ByGenesis([u8; 32]),
	/// The Polkadot mainnet Relay-chain.
	#[codec(index = 2)]
	Polkadot,
	/// The Kusama canary-net Relay-chain.
	#[codec(index = 3)]
	Kusama,
	/// The Westend testnet Relay-chain.
	#[codec(index = 4)]
	Westend,
	/// The Rococo testnet Relay-chain.
	#[codec(index = 5)]
	Rococo,
}

/// A single item in a path to describe the relative location of a consensus system.
#[derive(
	Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Encode, Decode, Serialize, Deserialize,
)]
pub enum Junction {
	/// An indexed parachain belonging to and operated by the context.
	#[codec(index = 0)]
	Parachain(#[codec(compact)] u32),
	/// A 32-byte identifier for an account of a specific network.
	#[codec(index = 1)]
	AccountId32 {
		network: Option<NetworkId>,
		#[serde(with = "hex_account")]
		id: [u8; 32],
	},
	/// An instanced, indexed pallet that forms a constituent part of the context.
	#[codec(index = 4)]
	PalletInstance(u8),
	/// A nondescript index within the context location.
	#[codec(index = 5)]
	GeneralIndex(#[codec(compact)] u128),
}

impl fmt::Display for Junction {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Junction::Parachain(id) => write!(f, "Parachain({id})"),
			Junction::AccountId32 { network, id } => {
				write!(f, "AccountId32({network:?}, 0x{})", hex::encode(id))
			},
			Junction::PalletInstance(index) => write!(f, "PalletInstance({index})"),
			Junction::GeneralIndex(index) => write!(f, "GeneralIndex({index})"),
		}
	}
}

/// The interior of a [`Location`]: an ordered sequence of at most [`MAX_JUNCTIONS`] junctions.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct Junctions(Vec<Junction>);

impl std::hash::Hash for Junction {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.encode().hash(state)
	}
}

impl Junctions {
	/// The empty interior.
	pub const fn here() -> Self {
		Self(Vec::new())
	}

	/// Create an interior from the given junctions.
	pub fn new(junctions: Vec<Junction>) -> Result<Self, LocationError> {
		if junctions.len() > MAX_JUNCTIONS {
			return Err(LocationError::TooManyJunctions(junctions.len()))
		}
		Ok(Self(junctions))
	}

	/// Returns `true` if the interior has no junctions.
	pub fn is_here(&self) -> bool {
		self.0.is_empty()
	}

	/// Number of junctions.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// The junctions as a slice.
	pub fn as_slice(&self) -> &[Junction] {
		&self.0
	}

	/// Iterate over the junctions, outermost first.
	pub fn iter(&self) -> impl Iterator<Item = &Junction> {
		self.0.iter()
	}

	/// The outermost junction.
	pub fn first(&self) -> Option<&Junction> {
		self.0.first()
	}

	/// The innermost junction.
	pub fn last(&self) -> Option<&Junction> {
		self.0.last()
	}

	/// Prepend `junction`, failing if the interior is already full.
	pub fn push_front(&mut self, junction: Junction) -> Result<(), LocationError> {
		if self.0.len() == MAX_JUNCTIONS {
			return Err(LocationError::TooManyJunctions(MAX_JUNCTIONS + 1))
		}
		self.0.insert(0, junction);
		Ok(())
	}
}

impl<const N: usize> TryFrom<[Junction; N]> for Junctions {
	type Error = LocationError;

	fn try_from(junctions: [Junction; N]) -> Result<Self, Self::Error> {
		Self::new(junctions.to_vec())
	}
}

impl Encode for Junctions {
	fn size_hint(&self) -> usize {
		1 + self.0.iter().map(Encode::size_hint).sum::<usize>()
	}

	fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
		dest.push_byte(self.0.len() as u8);
		for junction in &self.0 {
			junction.encode_to(dest);
		}
	}
}

impl Decode for Junctions {
	fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
		let len = input.read_byte()? as usize;
		if len > MAX_JUNCTIONS {
			return Err("Invalid Junctions variant index".into())
		}
		let mut junctions = Vec::with_capacity(len);
		for _ in 0..len {
			junctions.push(Junction::decode(input)?);
		}
		Ok(Self(junctions))
	}
}

// Mirrors the polkadot.js JSON shape: `"Here"` or `{ "X3": [ ... ] }`.
impl Serialize for Junctions {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		if self.0.is_empty() {
			return serializer.serialize_str(HERE)
		}
		let mut map = serializer.serialize_map(Some(1))?;
		map.serialize_entry(&format!("X{}", self.0.len()), &self.0)?;
		map.end()
	}
}

impl<'de> Deserialize<'de> for Junctions {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		deserializer.deserialize_any(JunctionsVisitor)
	}
}

struct JunctionsVisitor;

impl<'de> Visitor<'de> for JunctionsVisitor {
	type Value = Junctions;

	fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str("`\"Here\"` or a single-entry map `{ \"Xn\": [junctions] }`")
	}

	fn visit_str<E: DeError>(self, tag: &str) -> Result<Junctions, E> {
		if tag == HERE {
			Ok(Junctions::here())
		} else {
			Err(E::custom(format!("unknown interior `{tag}`")))
		}
	}

	fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Junctions, A::Error> {
		let Some((tag, junctions)) = map.next_entry::<String, Vec<Junction>>()? else {
			return Err(A::Error::custom("interior map is empty"))
		};
		if map.next_key::<String>()?.is_some() {
			return Err(A::Error::custom("interior must have exactly one variant"))
		}
		if tag != format!("X{}", junctions.len()) {
			return Err(A::Error::custom(format!(
				"interior `{tag}` does not match {} junctions",
				junctions.len()
			)))
		}
		Junctions::new(junctions).map_err(A::Error::custom)
	}
}

/// A relative path between state-bearing consensus systems.
#[derive(
	Clone,
	Eq,
	PartialEq,
	Ord,
	PartialOrd,
	Debug,
	Default,
	Hash,
	Encode,
	Decode,
	Serialize,
	Deserialize,
)]
pub struct Location {
	/// Number of hops up the hierarchy before `interior` is interpreted.
	pub parents: u8,
	/// Path descending from the ancestor reached after `parents` hops.
	pub interior: Junctions,
}

impl Location {
	/// Create a location, failing if `junctions` is longer than [`MAX_JUNCTIONS`].
	pub fn new(
		parents: u8,
		junctions: impl IntoIterator<Item = Junction>,
	) -> Result<Self, LocationError> {
		Ok(Self { parents, interior: Junctions::new(junctions.into_iter().collect())? })
	}

	/// The location of the current context.
	pub const fn here() -> Self {
		Self { parents: 0, interior: Junctions::here() }
	}

	/// The parent of the current context. For a parachain this is the relay chain and the asset
	/// at this location is the relay native currency.
	pub const fn parent() -> Self {
		Self { parents: 1, interior: Junctions::here() }
	}

	/// A sibling parachain, as seen from another parachain.
	pub fn sibling(para_id: u32) -> Self {
		Self { parents: 1, interior: Junctions(vec![Junction::Parachain(para_id)]) }
	}

	/// An asset of a pallet instance on a sibling parachain:
	/// `(1, [Parachain(para_id), PalletInstance(pallet), GeneralIndex(index)])`.
	pub fn sibling_asset(para_id: u32, pallet_instance: u8, asset_index: u128) -> Self {
		Self {
			parents: 1,
			interior: Junctions(vec![
				Junction::Parachain(para_id),
				Junction::PalletInstance(pallet_instance),
				Junction::GeneralIndex(asset_index),
			]),
		}
	}

	/// An asset of a pallet instance on the current chain:
	/// `(0, [PalletInstance(pallet), GeneralIndex(index)])`.
	pub fn local_asset(pallet_instance: u8, asset_index: u128) -> Self {
		Self {
			parents: 0,
			interior: Junctions(vec![
				Junction::PalletInstance(pallet_instance),
				Junction::GeneralIndex(asset_index),
			]),
		}
	}

	/// A 32-byte account on the current chain.
	pub fn account_id32(network: Option<NetworkId>, id: [u8; 32]) -> Self {
		Self { parents: 0, interior: Junctions(vec![Junction::AccountId32 { network, id }]) }
	}

	/// Returns `(para_id, pallet_instance, asset_index)` if this location has the shape produced
	/// by [`Location::sibling_asset`].
	pub fn sibling_asset_parts(&self) -> Option<(u32, u8, u128)> {
		match (self.parents, self.interior.as_slice()) {
			(
				1,
				[
					Junction::Parachain(para_id),
					Junction::PalletInstance(pallet),
					Junction::GeneralIndex(index),
				],
			) => Some((*para_id, *pallet, *index)),
			_ => None,
		}
	}

	/// Express a location relative to `origin_para_id` as seen from one of its siblings.
	///
	/// Only locations interior to the origin (`parents == 0`) and the shared relay chain
	/// (`parents == 1`, no interior) can be reanchored.
	pub fn reanchored_for_sibling(&self, origin_para_id: u32) -> Result<Self, LocationError> {
		match self.parents {
			0 => {
				let mut interior = self.interior.clone();
				interior
					.push_front(Junction::Parachain(origin_para_id))
					.map_err(|_| LocationError::CannotReanchor(self.clone()))?;
				Ok(Self { parents: 1, interior })
			},
			1 if self.interior.is_here() => Ok(self.clone()),
			_ => Err(LocationError::CannotReanchor(self.clone())),
		}
	}
}

impl fmt::Display for Location {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "({}, [", self.parents)?;
		for (i, junction) in self.interior.iter().enumerate() {
			if i > 0 {
				write!(f, ", ")?;
			}
			write!(f, "{junction}")?;
		}
		write!(f, "])")
	}
}

/// Classification of an asset as fungible or not. Only fungible assets are supported.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Encode, Decode, Serialize, Deserialize)]
pub enum Fungibility {
	/// A fungible asset; the amount is its quantity.
	#[codec(index = 0)]
	Fungible(#[codec(compact)] u128),
}

/// An asset together with its amount, as moved by cross-chain transfers.
#[derive(Clone, Eq, PartialEq, Debug, Encode, Decode, Serialize, Deserialize)]
pub struct Asset {
	pub id: Location,
	pub fun: Fungibility,
}

impl Asset {
	pub fn fungible(id: Location, amount: u128) -> Self {
		Self { id, fun: Fungibility::Fungible(amount) }
	}

	/// The amount of the asset.
	pub fn amount(&self) -> u128 {
		let Fungibility::Fungible(amount) = self.fun;
		amount
	}
}

/// Sovereign account of sibling parachain `para_id` on another parachain:
/// `b"sibl" ++ para_id (little endian) ++ zero padding`.
pub fn sibling_account(para_id: u32) -> [u8; 32] {
	let mut account = [0u8; 32];
	account[..4].copy_from_slice(b"sibl");
	account[4..8].copy_from_slice(&para_id.to_le_bytes());
	account
}

mod hex_account {
	use serde::{de::Error, Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(id: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&format!("0x{}", hex::encode(id)))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
		let text = String::deserialize(deserializer)?;
		let mut id = [0u8; 32];
		hex::decode_to_slice(text.trim_start_matches("0x"), &mut id).map_err(D::Error::custom)?;
		Ok(id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use hex_literal::hex;
	use pretty_assertions::assert_eq;

	#[test]
	fn sibling_asset_round_trips_through_scale() {
		for (para_id, pallet, index) in [(1000, 50, 0), (2034, 51, 1_984), (1, 0, u128::MAX)] {
			let location = Location::sibling_asset(para_id, pallet, index);
			let decoded = Location::decode(&mut &location.encode()[..]).unwrap();
			assert_eq!(decoded.sibling_asset_parts(), Some((para_id, pallet, index)));
			assert_eq!(decoded, location);
		}
	}

	#[test]
	fn encoding_matches_xcm_layout() {
		// (1, X3(Parachain(1000), PalletInstance(50), GeneralIndex(1984)))
		let location = Location::sibling_asset(1000, 50, 1984);
		assert_eq!(location.encode(), hex!("010300a10f043205011f").to_vec());

		assert_eq!(Location::parent().encode(), vec![1, 0]);
		assert_eq!(Location::here().encode(), vec![0, 0]);
	}

	#[test]
	fn decoding_rejects_oversized_interior() {
		let mut encoded = vec![0u8, 9];
		encoded.extend(std::iter::repeat(Junction::PalletInstance(1).encode()).take(9).flatten());
		assert!(Location::decode(&mut &encoded[..]).is_err());
	}

	#[test]
	fn new_rejects_more_than_eight_junctions() {
		let junctions = (0..9).map(Junction::PalletInstance);
		assert_eq!(Location::new(0, junctions), Err(LocationError::TooManyJunctions(9)));
	}

	#[test]
	fn reanchoring_prefixes_origin_parachain() {
		let local = Location::local_asset(50, 7);
		assert_eq!(local.reanchored_for_sibling(1000), Ok(Location::sibling_asset(1000, 50, 7)));
		assert_eq!(Location::parent().reanchored_for_sibling(1000), Ok(Location::parent()));
		assert!(Location::sibling(2034).reanchored_for_sibling(1000).is_err());
	}

	#[test]
	fn json_uses_polkadot_js_shape() {
		let location = Location::sibling_asset(1000, 50, 3);
		let json = serde_json::to_value(&location).unwrap();
		assert_eq!(
			json,
			serde_json::json!({
				"parents": 1,
				"interior": { "X3": [{ "Parachain": 1000 }, { "PalletInstance": 50 }, { "GeneralIndex": 3 }] }
			})
		);
		assert_eq!(serde_json::from_value::<Location>(json).unwrap(), location);

		let here: Location = serde_json::from_str(r#"{"parents":1,"interior":"Here"}"#).unwrap();
		assert_eq!(here, Location::parent());
	}

	#[test]
	fn json_rejects_mismatched_variant() {
		let json = r#"{"parents":1,"interior":{"X2":[{"Parachain":1000}]}}"#;
		assert!(serde_json::from_str::<Location>(json).is_err());
	}

	#[test]
	fn sibling_account_layout() {
		let account = sibling_account(2034);
		assert_eq!(&account[..8], &hex!("7369626cf2070000"));
		assert!(account[8..].iter().all(|byte| *byte == 0));
	}

	#[test]
	fn fungible_asset_encoding() {
		let asset = Asset::fungible(Location::parent(), 1_000);
		// id: (1, Here), fun: Fungible(compact 1000)
		assert_eq!(asset.encode(), hex!("010000a10f").to_vec());
		assert_eq!(asset.amount(), 1_000);
	}

	#[test]
	fn account_junction_serializes_id_as_hex() {
		let location = Location::account_id32(None, [0xab; 32]);
		let json = serde_json::to_string(&location).unwrap();
		assert!(json.contains(&format!("0x{}", "ab".repeat(32))));
		assert_eq!(serde_json::from_str::<Location>(&json).unwrap(), location);
	}
}
