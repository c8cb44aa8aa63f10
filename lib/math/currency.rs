//! KES cent conversion utilities with standardized rounding.
//!
//! Share quantities and LMSR math are f64 KES; everything that touches a
//! balance or the pool is integer cents. Conversion is explicit about
//! rounding direction so money never appears or disappears by accident.
//!
//! # Rounding Conventions
//! - `Rounding::Up` (ceil): amounts charged TO a user (fees)
//! - `Rounding::Down` (floor): amounts paid TO a user (payouts)
//! - `Rounding::Nearest` (round): neutral reporting values

use thiserror::Error;

pub const CENTS_PER_KES: f64 = 100.0;

/// Errors that can occur during cent conversion.
#[derive(Debug, Clone, Error)]
pub enum CurrencyError {
    #[error("non-finite amount: {0}")]
    NonFinite(f64),
    #[error("negative amount not allowed: {0}")]
    Negative(f64),
    #[error("amount exceeds maximum: {0}")]
    Overflow(f64),
}

/// Rounding strategy for cent conversions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rounding {
    /// Round up (ceil) - use for amounts charged TO a user.
    Up,
    /// Round down (floor) - use for amounts paid TO a user.
    Down,
    /// Round to nearest - use for neutral reporting values.
    Nearest,
}

/// Convert a KES amount to u64 cents with validation and explicit rounding.
///
/// # Errors
/// Returns `CurrencyError` if the amount is NaN or infinite, negative, or
/// rounds beyond `u64::MAX`.
pub fn to_cents(kes: f64, mode: Rounding) -> Result<u64, CurrencyError> {
    if !kes.is_finite() {
        return Err(CurrencyError::NonFinite(kes));
    }
    if kes < 0.0 {
        return Err(CurrencyError::Negative(kes));
    }
    let cents = kes * CENTS_PER_KES;
    let rounded = match mode {
        Rounding::Up => cents.ceil(),
        Rounding::Down => cents.floor(),
        Rounding::Nearest => cents.round(),
    };
    if rounded > u64::MAX as f64 {
        return Err(CurrencyError::Overflow(kes));
    }
    Ok(rounded as u64)
}

/// Convert integer cents back to a KES amount.
pub fn to_kes(cents: u64) -> f64 {
    cents as f64 / CENTS_PER_KES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_cents_rounding_up() {
        assert_eq!(to_cents(100.0, Rounding::Up).unwrap(), 10_000);
        assert_eq!(to_cents(100.001, Rounding::Up).unwrap(), 10_001);
        assert_eq!(to_cents(100.009, Rounding::Up).unwrap(), 10_001);
        assert_eq!(to_cents(0.0, Rounding::Up).unwrap(), 0);
    }

    #[test]
    fn test_to_cents_rounding_down() {
        assert_eq!(to_cents(100.0, Rounding::Down).unwrap(), 10_000);
        assert_eq!(to_cents(100.001, Rounding::Down).unwrap(), 10_000);
        assert_eq!(to_cents(100.009, Rounding::Down).unwrap(), 10_000);
    }

    #[test]
    fn test_to_cents_rounding_nearest() {
        assert_eq!(to_cents(100.004, Rounding::Nearest).unwrap(), 10_000);
        assert_eq!(to_cents(100.006, Rounding::Nearest).unwrap(), 10_001);
    }

    #[test]
    fn test_to_cents_negative_error() {
        assert!(matches!(
            to_cents(-1.0, Rounding::Up),
            Err(CurrencyError::Negative(_))
        ));
    }

    #[test]
    fn test_to_cents_non_finite_error() {
        assert!(matches!(
            to_cents(f64::NAN, Rounding::Up),
            Err(CurrencyError::NonFinite(_))
        ));
        assert!(matches!(
            to_cents(f64::INFINITY, Rounding::Up),
            Err(CurrencyError::NonFinite(_))
        ));
    }

    #[test]
    fn test_round_trip() {
        assert_eq!(to_kes(12_345), 123.45);
        assert_eq!(to_cents(to_kes(12_345), Rounding::Nearest).unwrap(), 12_345);
    }
}
