//! Retail price validation against wholesaler catalog prices.

use crate::types::{Money, Rate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetailConfidence {
    High,
    Low,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetailValidation {
    pub calculated:   Option<Money>,
    pub actual:       Option<Money>,
    /// |calculated − actual| / actual, as a fraction.
    pub variance_pct: Option<Rate>,
    pub confidence:   RetailConfidence,
}

/// Compare a calculated retail revenue with the market price.
///
/// `High` when the variance is within `threshold`, `Low` beyond it and
/// `Unknown` when either price is missing or the actual price is zero.
pub fn validate_retail(
    calculated: Option<Money>,
    actual: Option<Money>,
    threshold: Rate,
) -> RetailValidation {
    let variance_pct = match (calculated, actual) {
        (Some(calc), Some(act)) if !act.is_zero() => Some((calc - act).abs() / act.abs()),
        _ => None,
    };

    let confidence = match variance_pct {
        Some(v) if v <= threshold => RetailConfidence::High,
        Some(_) => RetailConfidence::Low,
        None => RetailConfidence::Unknown,
    };

    RetailValidation {
        calculated,
        actual,
        variance_pct,
        confidence,
    }
}

impl RetailValidation {
    pub fn is_valid(&self) -> bool {
        self.confidence == RetailConfidence::High
    }

    pub fn variance_percent(&self) -> Option<Decimal> {
        self.variance_pct.map(|v| v * Decimal::ONE_HUNDRED)
    }
}
