// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Conversions between the provisioner primitives and dynamic [`Value`]s.
//!
//! Locations are rendered in the shape the runtime metadata expects for the given
//! [`XcmVersion`]: v3 interiors carry their junctions as separate fields (`X3(a, b, c)`), v4
//! interiors wrap them in an array (`X3([a, b, c])`). Decoding accepts both shapes as well as
//! `V3`/`V4` version wrappers and single-field newtypes around a location.

use crate::ChainError;
use subxt::{
	dynamic::Value,
	ext::scale_value::{At, Composite, Primitive, ValueDef, Variant},
};
use xcm_provisioner_primitives::{Asset, Fungibility, Junction, Location, NetworkId};

/// XCM version used to shape location values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XcmVersion {
	V3,
	V4,
}

impl XcmVersion {
	fn variant_name(&self) -> &'static str {
		match self {
			XcmVersion::V3 => "V3",
			XcmVersion::V4 => "V4",
		}
	}
}

fn unexpected(what: &str, value: &Value) -> ChainError {
	ChainError::UnexpectedValue(format!("expected {what}, got {value}"))
}

/// `None` or `Some(value)`.
pub fn option(value: Option<Value>) -> Value {
	match value {
		Some(value) => Value::unnamed_variant("Some", [value]),
		None => Value::unnamed_variant("None", []),
	}
}

pub fn network_id(network: &NetworkId) -> Value {
	match network {
		NetworkId::ByGenesis(genesis) => {
			Value::unnamed_variant("ByGenesis", [Value::from_bytes(genesis)])
		},
		NetworkId::Polkadot => Value::unnamed_variant("Polkadot", []),
		NetworkId::Kusama => Value::unnamed_variant("Kusama", []),
		NetworkId::Westend => Value::unnamed_variant("Westend", []),
		NetworkId::Rococo => Value::unnamed_variant("Rococo", []),
	}
}

pub fn junction(junction: &Junction) -> Value {
	match junction {
		Junction::Parachain(id) => Value::unnamed_variant("Parachain", [Value::u128(*id as u128)]),
		Junction::AccountId32 { network, id } => Value::named_variant(
			"AccountId32",
			[("network", option(network.as_ref().map(network_id))), ("id", Value::from_bytes(id))],
		),
		Junction::PalletInstance(index) => {
			Value::unnamed_variant("PalletInstance", [Value::u128(*index as u128)])
		},
		Junction::GeneralIndex(index) => {
			Value::unnamed_variant("GeneralIndex", [Value::u128(*index)])
		},
	}
}

/// A location shaped for `version`.
pub fn location(location: &Location, version: XcmVersion) -> Value {
	let junctions = location.interior.iter().map(junction);
	let interior = if location.interior.is_here() {
		Value::unnamed_variant("Here", [])
	} else {
		let name = format!("X{}", location.interior.len());
		match version {
			XcmVersion::V3 => Value::unnamed_variant(name, junctions),
			XcmVersion::V4 => Value::unnamed_variant(name, [Value::unnamed_composite(junctions)]),
		}
	};
	Value::named_composite([
		("parents", Value::u128(location.parents as u128)),
		("interior", interior),
	])
}

/// A `VersionedLocation`.
pub fn versioned_location(location: &Location, version: XcmVersion) -> Value {
	Value::unnamed_variant(version.variant_name(), [self::location(location, version)])
}

pub fn asset(asset: &Asset, version: XcmVersion) -> Value {
	let Fungibility::Fungible(amount) = asset.fun;
	Value::named_composite([
		("id", location(&asset.id, version)),
		("fun", Value::unnamed_variant("Fungible", [Value::u128(amount)])),
	])
}

/// A `VersionedAssets` holding `assets` in the given order.
pub fn versioned_assets(assets: &[Asset], version: XcmVersion) -> Value {
	let assets = Value::unnamed_composite(assets.iter().map(|item| asset(item, version)));
	Value::unnamed_variant(version.variant_name(), [assets])
}

/// An `AccountId32`.
pub fn account_id(id: &[u8; 32]) -> Value {
	Value::from_bytes(id)
}

/// A `MultiAddress::Id` pointing at `id`.
pub fn multi_address(id: &[u8; 32]) -> Value {
	Value::unnamed_variant("Id", [account_id(id)])
}

/// Look up a named field of a composite value.
pub fn field<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
	value.at(name)
}

/// Strip single-field composites around `value`.
fn unwrap_newtype(value: &Value) -> &Value {
	match &value.value {
		ValueDef::Composite(Composite::Unnamed(values)) if values.len() == 1 => {
			unwrap_newtype(&values[0])
		},
		ValueDef::Composite(Composite::Named(values)) if values.len() == 1 => {
			unwrap_newtype(&values[0].1)
		},
		_ => value,
	}
}

pub fn to_u128(value: &Value) -> Result<u128, ChainError> {
	match &unwrap_newtype(value).value {
		ValueDef::Primitive(Primitive::U128(n)) => Ok(*n),
		ValueDef::Primitive(Primitive::I128(n)) => {
			u128::try_from(*n).map_err(|_| unexpected("an unsigned integer", value))
		},
		_ => Err(unexpected("an unsigned integer", value)),
	}
}

pub fn to_u32(value: &Value) -> Result<u32, ChainError> {
	u32::try_from(to_u128(value)?).map_err(|_| unexpected("a u32", value))
}

pub fn to_u8(value: &Value) -> Result<u8, ChainError> {
	u8::try_from(to_u128(value)?).map_err(|_| unexpected("a u8", value))
}

/// Bytes of a value encoded as a (possibly nested) sequence of `u8`s.
pub fn to_bytes(value: &Value) -> Result<Vec<u8>, ChainError> {
	match &value.value {
		ValueDef::Composite(composite) => {
			let values: Vec<&Value> = composite.values().collect();
			if values.len() == 1 {
				if let ValueDef::Composite(_) = values[0].value {
					return to_bytes(values[0])
				}
			}
			values.into_iter().map(to_u8).collect()
		},
		ValueDef::Primitive(Primitive::String(text)) => {
			hex::decode(text.trim_start_matches("0x")).map_err(|_| unexpected("hex bytes", value))
		},
		_ => Err(unexpected("a byte sequence", value)),
	}
}

pub fn to_account_id(value: &Value) -> Result<[u8; 32], ChainError> {
	let value = match &value.value {
		ValueDef::Variant(Variant { name, values }) if name == "Id" => {
			values.values().next().ok_or_else(|| unexpected("an account", value))?
		},
		_ => value,
	};
	to_bytes(value)?.try_into().map_err(|_| unexpected("a 32 byte account", value))
}

/// The inner value of `Some(value)`, `None` for `None`.
pub fn to_option(value: &Value) -> Result<Option<&Value>, ChainError> {
	match &value.value {
		ValueDef::Variant(Variant { name, values }) if name == "None" && values.is_empty() => {
			Ok(None)
		},
		ValueDef::Variant(Variant { name, values }) if name == "Some" && values.len() == 1 => {
			Ok(values.values().next())
		},
		_ => Err(unexpected("an option", value)),
	}
}

fn to_network_id(value: &Value) -> Result<NetworkId, ChainError> {
	let ValueDef::Variant(Variant { name, values }) = &value.value else {
		return Err(unexpected("a network id", value))
	};
	Ok(match name.as_str() {
		"ByGenesis" => {
			let genesis =
				values.values().next().ok_or_else(|| unexpected("a genesis hash", value))?;
			NetworkId::ByGenesis(
				to_bytes(genesis)?.try_into().map_err(|_| unexpected("a genesis hash", value))?,
			)
		},
		"Polkadot" => NetworkId::Polkadot,
		"Kusama" => NetworkId::Kusama,
		"Westend" => NetworkId::Westend,
		"Rococo" => NetworkId::Rococo,
		_ => return Err(unexpected("a supported network id", value)),
	})
}

pub fn to_junction(value: &Value) -> Result<Junction, ChainError> {
	let ValueDef::Variant(Variant { name, values }) = &value.value else {
		return Err(unexpected("a junction", value))
	};
	let first = || values.values().next().ok_or_else(|| unexpected("a junction field", value));
	Ok(match name.as_str() {
		"Parachain" => Junction::Parachain(to_u32(first()?)?),
		"PalletInstance" => Junction::PalletInstance(to_u8(first()?)?),
		"GeneralIndex" => Junction::GeneralIndex(to_u128(first()?)?),
		"AccountId32" => {
			let mut fields = values.values();
			let (Some(network), Some(id)) = (fields.next(), fields.next()) else {
				return Err(unexpected("an AccountId32 junction", value))
			};
			let network = to_option(network)?.map(to_network_id).transpose()?;
			let id = to_bytes(id)?.try_into().map_err(|_| unexpected("a 32 byte id", value))?;
			Junction::AccountId32 { network, id }
		},
		_ => return Err(unexpected("a supported junction", value)),
	})
}

fn to_junctions(value: &Value) -> Result<Vec<Junction>, ChainError> {
	let ValueDef::Variant(Variant { name, values }) = &value.value else {
		return Err(unexpected("an interior", value))
	};
	if name == "Here" {
		return Ok(Vec::new())
	}
	let expected: usize = name
		.strip_prefix('X')
		.and_then(|count| count.parse().ok())
		.ok_or_else(|| unexpected("an interior variant", value))?;
	let fields: Vec<&Value> = values.values().collect();
	let junctions = match fields.as_slice() {
		[Value { value: ValueDef::Composite(array), .. }] => {
			array.values().map(to_junction).collect::<Result<Vec<_>, _>>()?
		},
		fields => fields.iter().copied().map(to_junction).collect::<Result<Vec<_>, _>>()?,
	};
	if junctions.len() != expected {
		return Err(unexpected(&format!("{expected} junctions"), value))
	}
	Ok(junctions)
}

/// Decode a location from any of the shapes produced by [`location`] and
/// [`versioned_location`].
pub fn to_location(value: &Value) -> Result<Location, ChainError> {
	let value = match &value.value {
		ValueDef::Variant(Variant { name, values }) if name == "V3" || name == "V4" => {
			values.values().next().ok_or_else(|| unexpected("a versioned location", value))?
		},
		_ => value,
	};
	let value = match &value.value {
		ValueDef::Composite(Composite::Unnamed(values)) if values.len() == 1 => &values[0],
		_ => value,
	};
	let (Some(parents), Some(interior)) = (field(value, "parents"), field(value, "interior"))
	else {
		return Err(unexpected("a location", value))
	};
	Location::new(to_u8(parents)?, to_junctions(interior)?)
		.map_err(|err| ChainError::UnexpectedValue(err.to_string()))
}

/// Decode `Fungible` assets from a `VersionedAssets` value.
pub fn to_assets(value: &Value) -> Result<Vec<Asset>, ChainError> {
	let inner = match &value.value {
		ValueDef::Variant(Variant { name, values }) if name == "V3" || name == "V4" => {
			values.values().next().ok_or_else(|| unexpected("versioned assets", value))?
		},
		_ => value,
	};
	let ValueDef::Composite(items) = &inner.value else {
		return Err(unexpected("a list of assets", value))
	};
	items
		.values()
		.map(|item| {
			let (Some(id), Some(fun)) = (field(item, "id"), field(item, "fun")) else {
				return Err(unexpected("an asset", item))
			};
			let ValueDef::Variant(Variant { name, values }) = &fun.value else {
				return Err(unexpected("a fungibility", fun))
			};
			if name != "Fungible" {
				return Err(unexpected("a fungible asset", fun))
			}
			let amount = values.values().next().ok_or_else(|| unexpected("an amount", fun))?;
			Ok(Asset::fungible(to_location(id)?, to_u128(amount)?))
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_matches::assert_matches;
	use pretty_assertions::assert_eq;

	#[test]
	fn sibling_asset_round_trips_in_both_versions() {
		let triple = Location::sibling_asset(1000, 50, 1984);
		for version in [XcmVersion::V3, XcmVersion::V4] {
			let value = location(&triple, version);
			let decoded = to_location(&value).unwrap();
			assert_eq!(decoded.sibling_asset_parts(), Some((1000, 50, 1984)));
			assert_eq!(to_location(&versioned_location(&triple, version)).unwrap(), triple);
		}
	}

	#[test]
	fn v3_and_v4_interiors_differ_in_shape() {
		let triple = Location::sibling_asset(1000, 50, 1);
		let v3 = location(&triple, XcmVersion::V3);
		let v4 = location(&triple, XcmVersion::V4);
		assert_ne!(v3, v4);

		let interior = field(&v4, "interior").unwrap();
		let ValueDef::Variant(Variant { name, values }) = &interior.value else {
			panic!("interior must be a variant")
		};
		assert_eq!(name, "X3");
		assert_eq!(values.len(), 1);
	}

	#[test]
	fn account_location_round_trips() {
		let beneficiary = Location::account_id32(Some(NetworkId::Polkadot), [7; 32]);
		let value = versioned_location(&beneficiary, XcmVersion::V4);
		assert_eq!(to_location(&value).unwrap(), beneficiary);

		let parent = Location::parent();
		assert_eq!(to_location(&location(&parent, XcmVersion::V4)).unwrap(), parent);
	}

	#[test]
	fn assets_round_trip_in_order() {
		let assets = vec![
			Asset::fungible(Location::local_asset(50, 3), 100),
			Asset::fungible(Location::parent(), 5),
		];
		assert_eq!(to_assets(&versioned_assets(&assets, XcmVersion::V4)).unwrap(), assets);
	}

	#[test]
	fn decodes_storage_shaped_values() {
		// `AccountId32([u8; 32])` decodes as a newtype around the byte array.
		let account = Value::unnamed_composite([Value::from_bytes([9u8; 32])]);
		assert_eq!(to_account_id(&account).unwrap(), [9; 32]);
		assert_eq!(to_account_id(&multi_address(&[3; 32])).unwrap(), [3; 32]);

		let wrapped = Value::unnamed_composite([Value::u128(42)]);
		assert_eq!(to_u32(&wrapped).unwrap(), 42);
		assert_matches!(to_u8(&Value::u128(300)), Err(ChainError::UnexpectedValue(_)));
	}

	#[test]
	fn options_decode() {
		assert_eq!(to_option(&option(None)).unwrap(), None);
		assert_eq!(to_option(&option(Some(Value::u128(1)))).unwrap(), Some(&Value::u128(1)));
		assert!(to_option(&Value::u128(1)).is_err());
	}

	#[test]
	fn rejects_mismatched_interior_length() {
		let value = Value::named_composite([
			("parents", Value::u128(1)),
			("interior", Value::unnamed_variant("X2", [junction(&Junction::Parachain(1))])),
		]);
		assert_matches!(to_location(&value), Err(ChainError::UnexpectedValue(_)));
	}
}
