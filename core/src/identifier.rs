//! Identifier normalization — drug package codes and payer billing codes.
//!
//! RULE: Every join key in the core is a `DrugIdentifier` or a
//! `BillingCode`. Raw strings never cross a join; a value that fails
//! normalization is dropped by the caller, never propagated.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed width of a normalized drug identifier.
pub const IDENTIFIER_WIDTH: usize = 11;

/// The literal a missing spreadsheet cell stringifies to.
const MISSING_TOKEN: &str = "NAN";

/// An 11-digit drug package identifier (NDC-11), leading zeros preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DrugIdentifier(String);

impl DrugIdentifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 5-4-2 labeler/product/package form, e.g. `00074-4339-02`.
    pub fn formatted(&self) -> String {
        match (self.0.get(..5), self.0.get(5..9), self.0.get(9..)) {
            (Some(labeler), Some(product), Some(package)) if self.0.len() == IDENTIFIER_WIDTH => {
                format!("{labeler}-{product}-{package}")
            }
            _ => self.0.clone(),
        }
    }
}

impl fmt::Display for DrugIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An uppercase payer billing code (HCPCS), e.g. `J0135`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillingCode(String);

impl BillingCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BillingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonicalize a raw identifier from any source file.
///
/// Separators are stripped, the value is left-padded with `0` to 11
/// characters and the rightmost 11 are kept. Returns `None` when the input
/// is blank or the result is not 11 digits.
pub fn normalize_identifier(raw: &str) -> Option<DrugIdentifier> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let cleaned: String = trimmed.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if cleaned.is_empty() {
        return None;
    }

    let padded = format!("{cleaned:0>width$}", width = IDENTIFIER_WIDTH);
    let tail = &padded[padded.len() - IDENTIFIER_WIDTH..];

    if tail.len() != IDENTIFIER_WIDTH || !tail.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    Some(DrugIdentifier(tail.to_string()))
}

/// Canonicalize a raw billing code: trim and uppercase.
///
/// Rejects blanks, the stringified-missing token `NAN` (any case) and
/// codes with embedded whitespace.
pub fn normalize_billing_code(raw: &str) -> Option<BillingCode> {
    let code = raw.trim().to_ascii_uppercase();
    if code.is_empty() || code == MISSING_TOKEN {
        return None;
    }
    if code.chars().any(char::is_whitespace) {
        return None;
    }
    Some(BillingCode(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatted_splits_five_four_two() {
        let id = normalize_identifier("74433902").unwrap();
        assert_eq!(id.as_str(), "00074433902");
        assert_eq!(id.formatted(), "00074-4339-02");
    }

    #[test]
    fn overlong_input_keeps_rightmost_digits() {
        let id = normalize_identifier("9912345678901").unwrap();
        assert_eq!(id.as_str(), "12345678901");
    }
}
