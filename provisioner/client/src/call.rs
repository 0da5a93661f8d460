// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Dynamic runtime calls and their atomic batches.

use subxt::{
	dynamic::Value,
	ext::scale_value::Composite,
	tx::DynamicPayload,
};

/// Pallet that executes batches.
pub const BATCH_PALLET: &str = "Utility";

/// Batch call that reverts every call if one of them fails.
pub const BATCH_CALL: &str = "batch_all";

/// A runtime call with named arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
	pallet: String,
	name: String,
	fields: Vec<(String, Value)>,
}

impl Call {
	pub fn new<'a>(
		pallet: &str,
		name: &str,
		fields: impl IntoIterator<Item = (&'a str, Value)>,
	) -> Self {
		Self {
			pallet: pallet.into(),
			name: name.into(),
			fields: fields.into_iter().map(|(name, value)| (name.to_string(), value)).collect(),
		}
	}

	pub fn pallet(&self) -> &str {
		&self.pallet
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Argument `name`, if present.
	pub fn field(&self, name: &str) -> Option<&Value> {
		self.fields.iter().find(|(field, _)| field == name).map(|(_, value)| value)
	}

	pub fn fields(&self) -> &[(String, Value)] {
		&self.fields
	}

	/// Returns `true` if this is `pallet::name`.
	pub fn is(&self, pallet: &str, name: &str) -> bool {
		self.pallet == pallet && self.name == name
	}

	/// Dynamic transaction payload executing this call on its own.
	pub fn payload(&self) -> DynamicPayload {
		subxt::dynamic::tx(
			self.pallet.as_str(),
			self.name.as_str(),
			Composite::Named(self.fields.clone()),
		)
	}

	/// The call as a `RuntimeCall` value, suitable as an argument of another call.
	pub fn to_value(&self) -> Value {
		self.payload().into_value()
	}
}

/// An ordered group of calls that is applied atomically in one transaction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchedCall {
	calls: Vec<Call>,
}

/// Group `calls` into one atomic batch, preserving their order.
pub fn compose(calls: impl IntoIterator<Item = Call>) -> BatchedCall {
	BatchedCall { calls: calls.into_iter().collect() }
}

impl BatchedCall {
	pub fn calls(&self) -> &[Call] {
		&self.calls
	}

	pub fn len(&self) -> usize {
		self.calls.len()
	}

	pub fn is_empty(&self) -> bool {
		self.calls.is_empty()
	}

	/// Dynamic payload of the `Utility::batch_all` call wrapping every call of the batch.
	pub fn payload(&self) -> DynamicPayload {
		let calls = Value::unnamed_composite(self.calls.iter().map(Call::to_value));
		subxt::dynamic::tx(
			BATCH_PALLET,
			BATCH_CALL,
			Composite::Named(vec![("calls".to_string(), calls)]),
		)
	}
}

impl From<Call> for BatchedCall {
	fn from(call: Call) -> Self {
		compose([call])
	}
}
