// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-point currency amounts.
//!
//! Costs are summed thousands of times a day. Holding them as an integer
//! count of micro-units keeps the running total exact; the decimal form only
//! appears at the edges (config input, JSON lines, log output).

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A non-negative currency amount in micro-units (1.0 = 1_000_000 micros).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cost(u64);

impl Cost {
    /// Zero cost.
    pub const ZERO: Cost = Cost(0);

    /// Micro-units per whole currency unit.
    pub const MICROS_PER_UNIT: u64 = 1_000_000;

    /// Build a cost from an integer number of micro-units.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// The amount in micro-units.
    pub const fn micros(self) -> u64 {
        self.0
    }

    /// Convert a decimal amount, rounding to the nearest micro-unit.
    ///
    /// Returns `None` for negative, NaN or infinite input.
    pub fn from_decimal(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let micros = (value * Self::MICROS_PER_UNIT as f64).round();
        if micros >= u64::MAX as f64 {
            return Some(Self(u64::MAX));
        }
        Some(Self(micros as u64))
    }

    /// The amount as a decimal number, for display and JSON output.
    pub fn to_decimal(self) -> f64 {
        self.0 as f64 / Self::MICROS_PER_UNIT as f64
    }

    /// Saturating addition.
    pub const fn saturating_add(self, other: Cost) -> Cost {
        Cost(self.0.saturating_add(other.0))
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Cost {
    fn add_assign(&mut self, rhs: Cost) {
        *self = self.saturating_add(rhs);
    }
}

impl Sum for Cost {
    fn sum<I: Iterator<Item = Cost>>(iter: I) -> Cost {
        iter.fold(Cost::ZERO, Add::add)
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::MICROS_PER_UNIT;
        let frac = self.0 % Self::MICROS_PER_UNIT;
        write!(f, "{whole}.{frac:06}")
    }
}

impl Serialize for Cost {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_decimal())
    }
}

impl<'de> Deserialize<'de> for Cost {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Cost::from_decimal(value).ok_or_else(|| {
            serde::de::Error::custom(format!("cost must be a finite non-negative number, got {value}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn from_decimal_rounds_to_nearest_micro() {
        assert_eq!(Cost::from_decimal(4.5).unwrap().micros(), 4_500_000);
        assert_eq!(Cost::from_decimal(0.0000004).unwrap().micros(), 0);
        assert_eq!(Cost::from_decimal(0.0000006).unwrap().micros(), 1);
        assert_eq!(Cost::from_decimal(5.10).unwrap().micros(), 5_100_000);
    }

    #[test]
    fn from_decimal_rejects_negative_and_non_finite() {
        assert!(Cost::from_decimal(-0.01).is_none());
        assert!(Cost::from_decimal(f64::NAN).is_none());
        assert!(Cost::from_decimal(f64::INFINITY).is_none());
    }

    #[test]
    fn repeated_addition_does_not_drift() {
        let cent = Cost::from_decimal(0.01).unwrap();
        let total: Cost = std::iter::repeat_n(cent, 10_000).sum();
        assert_eq!(total, Cost::from_decimal(100.0).unwrap());
    }

    #[test]
    fn display_uses_six_fractional_digits() {
        assert_eq!(Cost::from_micros(5_100_000).to_string(), "5.100000");
        assert_eq!(Cost::from_micros(123).to_string(), "0.000123");
        assert_eq!(Cost::ZERO.to_string(), "0.000000");
    }

    #[test]
    fn addition_saturates() {
        let max = Cost::from_micros(u64::MAX);
        assert_eq!(max + Cost::from_micros(1), max);
    }

    #[test]
    fn serializes_as_decimal_number() {
        let json = serde_json::to_string(&Cost::from_micros(1_234_567)).unwrap();
        assert_eq!(json, "1.234567");
        let parsed: Cost = serde_json::from_str("0.000123").unwrap();
        assert_eq!(parsed.micros(), 123);
        let parsed: Cost = serde_json::from_str("3").unwrap();
        assert_eq!(parsed.micros(), 3_000_000);
        assert!(serde_json::from_str::<Cost>("-1.0").is_err());
    }

    proptest! {
        #[test]
        fn json_preserves_micros(micros in 0u64..10_000_000_000_000) {
            let cost = Cost::from_micros(micros);
            let json = serde_json::to_string(&cost).unwrap();
            let back: Cost = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back, cost);
        }
    }
}
