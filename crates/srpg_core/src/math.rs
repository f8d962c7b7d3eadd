//! Fixed-point helpers for multiplier math.
//!
//! Damage and experience multipliers are authored as integer percents and
//! evaluated in fixed point so results never depend on the host's float
//! implementation. Final values always truncate toward zero.

use fixed::types::I32F32;

/// Fixed-point number type used for every fractional combat quantity.
pub type Fixed = I32F32;

/// Convert an integer percent (150 = 1.5x) into a fixed-point factor.
#[must_use]
pub fn from_percent(percent: i32) -> Fixed {
    Fixed::from_num(percent) / Fixed::from_num(100)
}

/// Truncate toward zero, saturating at the `i32` bounds.
#[must_use]
pub fn truncate(value: Fixed) -> i32 {
    value.round_to_zero().saturating_to_num::<i32>()
}

/// Multiply an integer by a fixed factor, truncating the result.
#[must_use]
pub fn scale(value: i32, factor: Fixed) -> i32 {
    truncate(Fixed::from_num(value).saturating_mul(factor))
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// so snapshots round-trip exactly.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bits.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bits.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}
