// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Types shared by the xcm-provisioner crates: chain-relative locations with their XCM-compatible
//! encoding, descriptors of provisioned assets and exact decimal prices.

pub mod asset;
pub mod location;
pub mod price;

pub use asset::{AssetDescriptor, AssetId, AssetSpec, Balance, CrossChainAssetRecord};
pub use location::{
	sibling_account, Asset, Fungibility, Junction, Junctions, Location, LocationError, NetworkId,
};
pub use price::{Price, PriceError};
