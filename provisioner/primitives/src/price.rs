// Copyright (C) Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

//! Exact decimal prices.

use serde::{
	de::{Error as DeError, Visitor},
	Deserialize, Deserializer, Serialize, Serializer,
};
use std::{fmt, str::FromStr};

/// Largest number of fractional digits a [`Price`] may carry.
pub const MAX_SCALE: u32 = 38;

/// Number of fractional digits of a `FixedU128`.
const FIXED_U128_SCALE: u32 = 18;

/// Errors produced while parsing or applying a [`Price`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceError {
	#[error("invalid decimal `{0}`")]
	Invalid(String),
	#[error("price must be greater than zero")]
	ZeroPrice,
	#[error("arithmetic overflow while applying price")]
	Overflow,
}

/// A non-negative decimal `mantissa / 10^scale`.
///
/// Arithmetic never goes through floating point: JSON numbers are rendered back to their shortest
/// decimal representation before parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Price {
	mantissa: u128,
	scale: u32,
}

impl Price {
	/// Create a price of `mantissa / 10^scale`.
	pub fn new(mantissa: u128, scale: u32) -> Result<Self, PriceError> {
		if scale > MAX_SCALE {
			return Err(PriceError::Invalid(format!("{mantissa}e-{scale}")))
		}
		Ok(Self { mantissa, scale }.normalized())
	}

	/// A whole-number price.
	pub const fn from_integer(value: u128) -> Self {
		Self { mantissa: value, scale: 0 }
	}

	pub fn mantissa(&self) -> u128 {
		self.mantissa
	}

	pub fn scale(&self) -> u32 {
		self.scale
	}

	pub fn is_zero(&self) -> bool {
		self.mantissa == 0
	}

	/// Amount of the quoted asset worth `base_amount` of the base asset when one quote unit costs
	/// `self` base units, i.e. `base_amount / self`, truncated towards zero.
	pub fn quote_for(&self, base_amount: u128) -> Result<u128, PriceError> {
		if self.is_zero() {
			return Err(PriceError::ZeroPrice)
		}
		base_amount
			.checked_mul(10u128.pow(self.scale))
			.map(|scaled| scaled / self.mantissa)
			.ok_or(PriceError::Overflow)
	}

	/// The inner value of a `FixedU128` representing this price (18 fractional digits, extra
	/// digits are truncated).
	pub fn to_fixed_u128(&self) -> Result<u128, PriceError> {
		if self.scale <= FIXED_U128_SCALE {
			self.mantissa
				.checked_mul(10u128.pow(FIXED_U128_SCALE - self.scale))
				.ok_or(PriceError::Overflow)
		} else {
			Ok(self.mantissa / 10u128.pow(self.scale - FIXED_U128_SCALE))
		}
	}

	fn normalized(mut self) -> Self {
		while self.scale > 0 && self.mantissa % 10 == 0 {
			self.mantissa /= 10;
			self.scale -= 1;
		}
		self
	}
}

impl FromStr for Price {
	type Err = PriceError;

	fn from_str(input: &str) -> Result<Self, Self::Err> {
		let invalid = || PriceError::Invalid(input.to_string());
		let text = input.trim().replace('_', "");
		let (whole, fraction) = match text.split_once('.') {
			Some((whole, fraction)) => (whole, fraction),
			None => (text.as_str(), ""),
		};
		if whole.is_empty() && fraction.is_empty() {
			return Err(invalid())
		}
		if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
			return Err(invalid())
		}
		let scale = u32::try_from(fraction.len()).map_err(|_| invalid())?;
		if scale > MAX_SCALE {
			return Err(invalid())
		}
		let digits = format!("{whole}{fraction}");
		let mantissa = digits.parse::<u128>().map_err(|_| invalid())?;
		Self::new(mantissa, scale)
	}
}

impl fmt::Display for Price {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		if self.scale == 0 {
			return write!(f, "{}", self.mantissa)
		}
		let divisor = 10u128.pow(self.scale);
		write!(
			f,
			"{}.{:0width$}",
			self.mantissa / divisor,
			self.mantissa % divisor,
			width = self.scale as usize
		)
	}
}

impl Serialize for Price {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for Price {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		deserializer.deserialize_any(PriceVisitor)
	}
}

struct PriceVisitor;

impl<'de> Visitor<'de> for PriceVisitor {
	type Value = Price;

	fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str("a non-negative decimal number or string")
	}

	fn visit_u64<E: DeError>(self, value: u64) -> Result<Price, E> {
		Ok(Price::from_integer(value.into()))
	}

	fn visit_i64<E: DeError>(self, value: i64) -> Result<Price, E> {
		u64::try_from(value)
			.map(|value| Price::from_integer(value.into()))
			.map_err(|_| E::custom(format!("negative price {value}")))
	}

	fn visit_f64<E: DeError>(self, value: f64) -> Result<Price, E> {
		if !value.is_finite() || value < 0.0 {
			return Err(E::custom(format!("invalid price {value}")))
		}
		// `Display` for `f64` yields the shortest representation that round-trips.
		value.to_string().parse().map_err(E::custom)
	}

	fn visit_str<E: DeError>(self, value: &str) -> Result<Price, E> {
		value.parse().map_err(E::custom)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn parses_decimal_strings() {
		assert_eq!("1.25".parse::<Price>(), Price::new(125, 2));
		assert_eq!("0.000_001".parse::<Price>(), Price::new(1, 6));
		assert_eq!("42".parse::<Price>(), Ok(Price::from_integer(42)));
		assert_eq!(".5".parse::<Price>(), Price::new(5, 1));
		assert!("1.2.3".parse::<Price>().is_err());
		assert!("-1".parse::<Price>().is_err());
		assert!("".parse::<Price>().is_err());
	}

	#[test]
	fn trailing_zeros_are_normalized() {
		assert_eq!("2.500".parse::<Price>().unwrap(), Price::new(25, 1).unwrap());
		assert_eq!(Price::new(2500, 3).unwrap().to_string(), "2.5");
	}

	#[test]
	fn quote_truncates() {
		let price: Price = "3".parse().unwrap();
		assert_eq!(price.quote_for(100), Ok(33));

		let price: Price = "0.5".parse().unwrap();
		assert_eq!(price.quote_for(7), Ok(14));

		let price: Price = "1.5".parse().unwrap();
		assert_eq!(price.quote_for(10), Ok(6));
	}

	#[test]
	fn quote_rejects_zero_and_overflow() {
		assert_eq!(Price::from_integer(0).quote_for(10), Err(PriceError::ZeroPrice));
		let tiny = Price::new(1, 38).unwrap();
		assert_eq!(tiny.quote_for(u128::MAX), Err(PriceError::Overflow));
	}

	#[test]
	fn converts_to_fixed_u128() {
		assert_eq!("1".parse::<Price>().unwrap().to_fixed_u128(), Ok(1_000_000_000_000_000_000));
		assert_eq!("0.02".parse::<Price>().unwrap().to_fixed_u128(), Ok(20_000_000_000_000_000));
		let precise = Price::new(123, 20).unwrap();
		assert_eq!(precise.to_fixed_u128(), Ok(1));
	}

	#[test]
	fn json_accepts_numbers_and_strings() {
		assert_eq!(serde_json::from_str::<Price>("0.1").unwrap(), Price::new(1, 1).unwrap());
		assert_eq!(serde_json::from_str::<Price>("12").unwrap(), Price::from_integer(12));
		assert_eq!(serde_json::from_str::<Price>("\"0.003\"").unwrap(), Price::new(3, 3).unwrap());
		assert!(serde_json::from_str::<Price>("-0.5").is_err());
		assert_eq!(serde_json::to_string(&Price::new(105, 2).unwrap()).unwrap(), "\"1.05\"");
	}
}
