//! Shared primitive types used across the compute core.

use rust_decimal::Decimal;

/// A monetary amount in dollars. Always exact; rounded to cents on output.
pub type Money = Decimal;

/// A dimensionless multiplier or fraction (1.06, 0.85, 0.40, ...).
pub type Rate = Decimal;

/// The year a statutory negotiated price takes effect.
pub type IraYear = u16;

/// Days in the projection year used by the dosing resolver.
pub const DAYS_PER_YEAR: u32 = 365;
