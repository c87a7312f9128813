//! Identifier and billing-code normalization.
//!
//! Every join in the core keys on these two functions, so a wrong length or
//! a silently accepted blank corrupts every downstream stage.

use proptest::prelude::*;
use siteopt_core::identifier::{normalize_billing_code, normalize_identifier};

#[test]
fn hyphenated_ten_digit_code_is_padded() {
    let id = normalize_identifier("0074-4339-02").unwrap();
    assert_eq!(id.as_str(), "00074433902");
}

#[test]
fn separators_and_whitespace_are_stripped() {
    assert_eq!(normalize_identifier("  00074 4339.02 ").unwrap().as_str(), "00074433902");
    assert_eq!(normalize_identifier("00074-4339-02").unwrap().as_str(), "00074433902");
}

#[test]
fn already_normalized_identifier_is_unchanged() {
    assert_eq!(normalize_identifier("00074433902").unwrap().as_str(), "00074433902");
}

#[test]
fn blank_and_separator_only_inputs_are_rejected() {
    assert!(normalize_identifier("").is_none());
    assert!(normalize_identifier("   ").is_none());
    assert!(normalize_identifier("--").is_none());
}

#[test]
fn alphabetic_residue_is_rejected() {
    assert!(normalize_identifier("ABC-1234").is_none());
    assert!(normalize_identifier("nan").is_none());
}

#[test]
fn billing_code_is_trimmed_and_uppercased() {
    assert_eq!(normalize_billing_code(" j0135 ").unwrap().as_str(), "J0135");
}

#[test]
fn missing_value_token_is_rejected_in_any_case() {
    assert!(normalize_billing_code("nan").is_none());
    assert!(normalize_billing_code("NaN").is_none());
    assert!(normalize_billing_code(" NAN ").is_none());
}

#[test]
fn billing_code_with_inner_whitespace_is_rejected() {
    assert!(normalize_billing_code("J 0135").is_none());
    assert!(normalize_billing_code("").is_none());
}

proptest! {
    #[test]
    fn normalized_identifier_is_always_eleven_digits(raw in ".{0,24}") {
        if let Some(id) = normalize_identifier(&raw) {
            prop_assert_eq!(id.as_str().len(), 11);
            prop_assert!(id.as_str().bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn digit_strings_keep_their_trailing_digits(digits in "[0-9]{1,16}") {
        let id = normalize_identifier(&digits).unwrap();
        let tail = if digits.len() > 11 { &digits[digits.len() - 11..] } else { digits.as_str() };
        prop_assert!(id.as_str().ends_with(tail));
    }

    #[test]
    fn normalization_is_idempotent(raw in "[0-9 -]{0,20}") {
        if let Some(id) = normalize_identifier(&raw) {
            prop_assert_eq!(normalize_identifier(id.as_str()), Some(id));
        }
    }
}
