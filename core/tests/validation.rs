//! Retail price confidence against wholesaler catalog prices.

use rust_decimal_macros::dec;
use siteopt_core::validation::{validate_retail, RetailConfidence};

#[test]
fn variance_within_threshold_is_high_confidence() {
    let v = validate_retail(Some(dec!(110)), Some(dec!(100)), dec!(0.20));
    assert_eq!(v.confidence, RetailConfidence::High);
    assert_eq!(v.variance_pct, Some(dec!(0.10)));
    assert!(v.is_valid());
}

#[test]
fn variance_at_threshold_is_still_high() {
    let v = validate_retail(Some(dec!(80)), Some(dec!(100)), dec!(0.20));
    assert_eq!(v.confidence, RetailConfidence::High);
}

#[test]
fn variance_beyond_threshold_is_low_confidence() {
    let v = validate_retail(Some(dec!(5884.45)), Some(dec!(4000)), dec!(0.20));
    assert_eq!(v.confidence, RetailConfidence::Low);
    assert!(!v.is_valid());
}

#[test]
fn missing_or_zero_prices_are_unknown() {
    assert_eq!(validate_retail(None, Some(dec!(100)), dec!(0.20)).confidence, RetailConfidence::Unknown);
    assert_eq!(validate_retail(Some(dec!(100)), None, dec!(0.20)).confidence, RetailConfidence::Unknown);
    let zero = validate_retail(Some(dec!(100)), Some(dec!(0)), dec!(0.20));
    assert_eq!(zero.confidence, RetailConfidence::Unknown);
    assert_eq!(zero.variance_percent(), None);
}
