// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! JSON files holding asset lists.
//!
//! Files are written to a temporary file in the target directory first and then moved into place,
//! so a reader never observes a partially written list.

use crate::{Error, Result, LOG_TARGET};
use serde::{de::DeserializeOwned, Serialize};
use std::{
	io::Write,
	path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

/// A JSON array of `T`s stored at a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataStore {
	path: PathBuf,
}

impl MetadataStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn exists(&self) -> bool {
		self.path.exists()
	}

	fn error(&self, reason: impl ToString) -> Error {
		Error::Store { path: self.path.clone(), reason: reason.to_string() }
	}

	/// Fails if the file already exists.
	pub fn ensure_absent(&self) -> Result<()> {
		if self.exists() {
			return Err(self.error("already exists, refusing to overwrite"))
		}
		Ok(())
	}

	pub fn load<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
		let content = std::fs::read_to_string(&self.path).map_err(|err| self.error(err))?;
		serde_json::from_str(&content).map_err(|err| self.error(err))
	}

	/// Write `items` to a file that must not exist yet.
	pub fn save_new<T: Serialize>(&self, items: &[T]) -> Result<()> {
		let file = self.write_temporary(items)?;
		file.persist_noclobber(&self.path).map_err(|err| {
			if err.error.kind() == std::io::ErrorKind::AlreadyExists {
				self.error("already exists, refusing to overwrite")
			} else {
				self.error(err.error)
			}
		})?;
		log::debug!(target: LOG_TARGET, "Wrote {} item(s) to {}", items.len(), self.path.display());
		Ok(())
	}

	fn write_temporary<T: Serialize>(&self, items: &[T]) -> Result<NamedTempFile> {
		let directory = match self.path.parent() {
			Some(parent) if !parent.as_os_str().is_empty() => parent,
			_ => Path::new("."),
		};
		let mut file = NamedTempFile::new_in(directory).map_err(|err| self.error(err))?;
		let json = serde_json::to_string_pretty(items).map_err(|err| self.error(err))?;
		file.write_all(json.as_bytes()).map_err(|err| self.error(err))?;
		file.flush().map_err(|err| self.error(err))?;
		Ok(file)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_matches::assert_matches;
	use pretty_assertions::assert_eq;
	use xcm_provisioner_primitives::{CrossChainAssetRecord, Location, Price};

	fn record(id: u32) -> CrossChainAssetRecord {
		CrossChainAssetRecord {
			destination_local_id: 1_000_000 + id,
			origin_asset_id: id,
			name: format!("Asset {id}"),
			symbol: format!("A{id}"),
			decimals: 12,
			location: Location::sibling_asset(1000, 50, id.into()),
			initial_price: Some(Price::new(25, 1).unwrap()),
		}
	}

	#[test]
	fn records_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let store = MetadataStore::new(dir.path().join("records.json"));
		let records = vec![record(1), record(2)];

		store.save_new(&records).unwrap();
		assert_eq!(store.load::<CrossChainAssetRecord>().unwrap(), records);
	}

	#[test]
	fn save_new_never_overwrites() {
		let dir = tempfile::tempdir().unwrap();
		let store = MetadataStore::new(dir.path().join("records.json"));
		store.save_new(&[record(1)]).unwrap();

		assert_matches!(store.save_new(&[record(2)]), Err(Error::Store { .. }));
		assert_matches!(store.ensure_absent(), Err(Error::Store { .. }));
		assert_eq!(store.load::<CrossChainAssetRecord>().unwrap(), vec![record(1)]);
		assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
	}

	#[test]
	fn missing_file_is_a_store_error() {
		let dir = tempfile::tempdir().unwrap();
		let store = MetadataStore::new(dir.path().join("absent.json"));
		assert_matches!(store.load::<u32>(), Err(Error::Store { .. }));
		store.ensure_absent().unwrap();
	}
}
