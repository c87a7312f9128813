//! Same inputs, same config, same bytes.
//!
//! Two runs over an identical batch must serialize to identical JSON.
//! Any divergence is a blocker.

use rust_decimal_macros::dec;
use siteopt_core::{
    config::EngineConfig,
    crosswalk::CrosswalkAttributes,
    pipeline::{Pipeline, PipelineInputs, RawCatalogRow, RawCrosswalkRow, RawPaymentLimitRow},
};

fn batch() -> PipelineInputs {
    let mut inputs = PipelineInputs::default();
    for n in 0..200u32 {
        let ndc = format!("{:011}", 1_000 + n);
        inputs.catalog.push(RawCatalogRow {
            identifier:    ndc.clone(),
            product_name:  format!("DRUG {n}"),
            manufacturer:  None,
            is_brand:      n % 3 != 0,
            contract_cost: Some(dec!(50) + rust_decimal::Decimal::from(n % 17)),
            list_price:    Some(dec!(120) + rust_decimal::Decimal::from(n % 29)),
        });
        // Every drug maps to two codes, listed in descending order.
        for code in [format!("J{:04}", 9_000 - n % 40), format!("J{:04}", n % 40)] {
            inputs.crosswalk.push(RawCrosswalkRow {
                identifier:   ndc.clone(),
                billing_code: code,
                attributes: CrosswalkAttributes {
                    billing_units_per_package: Some(rust_decimal::Decimal::from(1 + n % 5)),
                    ..CrosswalkAttributes::default()
                },
            });
        }
    }
    for n in 0..40u32 {
        inputs.payment_limits.push(RawPaymentLimitRow {
            billing_code:  format!("J{:04}", 9_000 - n),
            payment_limit: dec!(13.37) + rust_decimal::Decimal::from(n),
        });
    }
    inputs
}

#[test]
fn identical_batches_produce_identical_output() {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = EngineConfig::default_test();

    let a = serde_json::to_string(&Pipeline::run(&batch(), &config).unwrap()).unwrap();
    let b = serde_json::to_string(&Pipeline::run(&batch(), &config).unwrap()).unwrap();

    assert_eq!(a, b, "pipeline output diverged between identical runs");
}

#[test]
fn ranked_order_is_total() {
    let out = Pipeline::run(&batch(), &EngineConfig::default_test()).unwrap();
    let ranked = &out.ranking.ranked;
    assert_eq!(ranked.len(), 200);
    for pair in ranked.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(
            a.blended_margin() > b.blended_margin()
                || (a.blended_margin() == b.blended_margin() && a.identifier < b.identifier),
            "{} before {} is out of order",
            a.identifier,
            b.identifier
        );
    }
}
