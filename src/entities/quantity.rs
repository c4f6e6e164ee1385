use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::DeriveValueType;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Fractional digits kept for stock and recipe amounts.
pub const QUANTITY_SCALE: u32 = 3;

const PER_UNIT: i64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("{0} has more than 3 decimal places")]
    TooPrecise(Decimal),
    #[error("{0} is out of range")]
    OutOfRange(Decimal),
}

/// A stock or recipe amount counted in thousandths of its unit.
///
/// Persisted as a `BIGINT`, so the conditional decrement in the database
/// subtracts and compares integers. Serializes as a decimal.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, DeriveValueType,
)]
pub struct Quantity(i64);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    pub const fn from_milli(milli: i64) -> Self {
        Quantity(milli)
    }

    pub const fn milli(self) -> i64 {
        self.0
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, QUANTITY_SCALE).normalize()
    }

    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_add(other.0).map(Quantity)
    }
}

impl TryFrom<Decimal> for Quantity {
    type Error = QuantityError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        let value = value.normalize();
        if value.scale() > QUANTITY_SCALE {
            return Err(QuantityError::TooPrecise(value));
        }
        value
            .checked_mul(Decimal::from(PER_UNIT))
            .and_then(|scaled| scaled.to_i64())
            .map(Quantity)
            .ok_or(QuantityError::OutOfRange(value))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_decimal(), f)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Serialize::serialize(&self.to_decimal(), serializer)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Quantity::try_from(value).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn decimals_convert_to_exact_thousandths() {
        assert_eq!(Quantity::try_from(dec!(0.1)).unwrap().milli(), 100);
        assert_eq!(Quantity::try_from(dec!(250)).unwrap().milli(), 250_000);
        assert_eq!(Quantity::try_from(dec!(1.500)).unwrap().milli(), 1_500);
        assert_eq!(Quantity::from_milli(300).to_decimal(), dec!(0.3));
    }

    #[test]
    fn three_tenths_sum_exactly() {
        let tenth = Quantity::try_from(dec!(0.1)).unwrap();
        let sum = tenth
            .checked_add(tenth)
            .and_then(|q| q.checked_add(tenth))
            .unwrap();
        assert_eq!(sum, Quantity::try_from(dec!(0.3)).unwrap());
        assert_eq!(sum.to_decimal(), dec!(0.3));
    }

    #[test]
    fn sub_thousandth_precision_is_rejected() {
        assert_eq!(
            Quantity::try_from(dec!(0.0001)),
            Err(QuantityError::TooPrecise(dec!(0.0001)))
        );
        assert!(matches!(
            Quantity::try_from(Decimal::MAX),
            Err(QuantityError::OutOfRange(_))
        ));
    }

    #[test]
    fn serializes_as_decimal() {
        let quantity = Quantity::from_milli(12_500);
        let json = serde_json::to_value(quantity).unwrap();
        assert_eq!(json, serde_json::to_value(dec!(12.5)).unwrap());
        let back: Quantity = serde_json::from_value(json).unwrap();
        assert_eq!(back, quantity);
    }
}
