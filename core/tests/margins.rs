//! Five-pathway margin engine.
//!
//! The medical pathways must match a hand calculation to the cent:
//! payment limit / 1.06, then the pathway multiplier, then billing units.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use siteopt_core::{
    config::{DosingBasis, MarginConfig},
    crosswalk::{CrosswalkAttributes, CrosswalkRow},
    dosing::DosingProfile,
    identifier::{normalize_billing_code, normalize_identifier},
    margin::{
        compute_margins, compute_margins_with_flags, true_payment_basis, MarginOutcome,
        MarginResult, MarginSet, Pathway, PENNY_COST,
    },
    record::{CatalogRecord, DrugRecord, NocPricing},
    risk::RiskFlags,
};

fn record(payment_limit: Option<Decimal>, units: Option<Decimal>) -> DrugRecord {
    let identifier = normalize_identifier("00074433902").unwrap();
    let mut record = DrugRecord::from_catalog(&CatalogRecord {
        identifier:    identifier.clone(),
        product_name:  "TEST BIOLOGIC".into(),
        manufacturer:  None,
        is_brand:      true,
        contract_cost: Some(dec!(100.00)),
        list_price:    Some(dec!(1000.00)),
    });
    record.crosswalk = Some(CrosswalkRow {
        identifier,
        primary_code:       normalize_billing_code("J0135").unwrap(),
        has_multiple_codes: false,
        alternate_codes:    Vec::new(),
        attributes: CrosswalkAttributes {
            billing_units_per_package: units,
            ..CrosswalkAttributes::default()
        },
    });
    record.prices.payment_limit = payment_limit;
    record
}

fn revenue(set: &MarginSet, pathway: Pathway) -> Decimal {
    set.get(pathway).revenue().unwrap()
}

#[test]
fn medicare_revenue_matches_hand_calculation() {
    let set = compute_margins(&record(Some(dec!(74.20)), Some(dec!(10))), &MarginConfig::default());

    assert_eq!(true_payment_basis(dec!(74.20)), dec!(70));
    assert_eq!(revenue(&set, Pathway::MedicalMedicare), dec!(742.00));
    assert_eq!(set.margin(Pathway::MedicalMedicare), Some(dec!(642.00)));
}

#[test]
fn each_medical_pathway_applies_its_multiplier_to_the_same_basis() {
    let set = compute_margins(&record(Some(dec!(74.20)), Some(dec!(10))), &MarginConfig::default());

    assert_eq!(revenue(&set, Pathway::MedicalMedicaid), dec!(728.00));
    assert_eq!(revenue(&set, Pathway::MedicalMedicare), dec!(742.00));
    assert_eq!(revenue(&set, Pathway::MedicalCommercial), dec!(805.00));
}

#[test]
fn commercial_multiplier_is_configurable() {
    let config = MarginConfig {
        commercial_multiplier: dec!(1.25),
        ..MarginConfig::default()
    };
    let set = compute_margins(&record(Some(dec!(74.20)), Some(dec!(10))), &config);
    assert_eq!(revenue(&set, Pathway::MedicalCommercial), dec!(875.00));
}

#[test]
fn back_calculation_rounds_to_the_cent() {
    // 10.00 / 1.06 × 1.06 × 3 is not exact in decimal; rounding restores 30.00.
    let set = compute_margins(&record(Some(dec!(10.00)), Some(dec!(3))), &MarginConfig::default());
    assert_eq!(revenue(&set, Pathway::MedicalMedicare), dec!(30.00));
}

#[test]
fn margin_equals_revenue_minus_cost_exactly() {
    let set = compute_margins(&record(Some(dec!(13.37)), Some(dec!(7))), &MarginConfig::default());
    for result in &set.results {
        if let MarginOutcome::Computed { revenue, cost, margin } = result.outcome {
            assert_eq!(margin, revenue - cost, "{}", result.pathway);
            assert_eq!(revenue.round_dp(2), revenue);
        }
    }
}

#[test]
fn pharmacy_list_price_uses_brand_or_generic_factor() {
    let mut drug = record(None, None);
    let set = compute_margins(&drug, &MarginConfig::default());
    assert_eq!(revenue(&set, Pathway::PharmacyMedicareCommercial), dec!(850.00));

    drug.is_brand = false;
    let set = compute_margins(&drug, &MarginConfig::default());
    assert_eq!(revenue(&set, Pathway::PharmacyMedicareCommercial), dec!(200.00));
}

#[test]
fn pharmacy_medicaid_adds_fee_then_markup() {
    let mut drug = record(None, None);
    drug.prices.acquisition_cost = Some(dec!(500.00));
    let config = MarginConfig {
        dispense_fee:        dec!(10.00),
        medicaid_markup_pct: dec!(0.05),
        ..MarginConfig::default()
    };
    let set = compute_margins(&drug, &config);
    assert_eq!(revenue(&set, Pathway::PharmacyMedicaid), dec!(535.50));
    assert_eq!(set.margin(Pathway::PharmacyMedicaid), Some(dec!(435.50)));
}

#[test]
fn missing_crosswalk_leaves_pharmacy_pathways_computed() {
    let mut drug = record(Some(dec!(74.20)), Some(dec!(10)));
    drug.crosswalk = None;
    drug.prices.acquisition_cost = Some(dec!(400.00));
    let set = compute_margins(&drug, &MarginConfig::default());

    assert!(set.get(Pathway::PharmacyMedicaid).is_computed());
    assert!(set.get(Pathway::PharmacyMedicareCommercial).is_computed());
    for pathway in [Pathway::MedicalMedicaid, Pathway::MedicalMedicare, Pathway::MedicalCommercial] {
        assert!(
            matches!(set.get(pathway).outcome, MarginOutcome::Undeterminable { .. }),
            "{pathway} should be undeterminable"
        );
    }
}

#[test]
fn missing_payment_limit_is_undeterminable_not_zero() {
    let set = compute_margins(&record(None, Some(dec!(10))), &MarginConfig::default());
    let result = set.get(Pathway::MedicalMedicare);
    assert_eq!(result.margin(), None);
    match &result.outcome {
        MarginOutcome::Undeterminable { reason } => assert!(reason.contains("payment limit")),
        other => panic!("expected undeterminable, got {other:?}"),
    }
}

#[test]
fn missing_acquisition_reference_only_affects_its_pathway() {
    let set = compute_margins(&record(Some(dec!(74.20)), Some(dec!(10))), &MarginConfig::default());
    assert!(!set.get(Pathway::PharmacyMedicaid).is_computed());
    assert_eq!(set.results.iter().filter(|r| r.is_computed()).count(), 4);
}

#[test]
fn missing_contract_cost_makes_every_pathway_undeterminable() {
    let mut drug = record(Some(dec!(74.20)), Some(dec!(10)));
    drug.prices.contract_cost = None;
    drug.prices.acquisition_cost = Some(dec!(400.00));
    let set = compute_margins(&drug, &MarginConfig::default());
    assert!(set.results.iter().all(|r| !r.is_computed()));
    assert!(set.recommendation().is_none());
}

#[test]
fn penny_pricing_overrides_pharmacy_cost_only() {
    let mut drug = record(Some(dec!(74.20)), Some(dec!(10)));
    drug.prices.acquisition_cost = Some(dec!(400.00));
    let flags = RiskFlags {
        penny_pricing: true,
        ..RiskFlags::default()
    };
    let set = compute_margins_with_flags(&drug, &flags, &MarginConfig::default());

    assert_eq!(set.get(Pathway::PharmacyMedicaid).cost(), Some(PENNY_COST));
    assert_eq!(set.get(Pathway::PharmacyMedicareCommercial).cost(), Some(dec!(0.01)));
    assert_eq!(set.get(Pathway::MedicalMedicare).cost(), Some(dec!(100.00)));
    // Source data is untouched.
    assert_eq!(drug.prices.contract_cost, Some(dec!(100.00)));
}

#[test]
fn dosing_profile_scales_billing_units_by_basis() {
    let mut drug = record(Some(dec!(74.20)), Some(dec!(10)));
    drug.dosing = Some(DosingProfile {
        induction_fills:             vec![dec!(2), dec!(2), dec!(1), dec!(1)],
        induction_days:              28,
        maintenance_fills_per_year:  12,
        maintenance_unit_multiplier: dec!(1),
    });

    let maintenance = compute_margins(
        &drug,
        &MarginConfig {
            dosing_basis: DosingBasis::Maintenance,
            ..MarginConfig::default()
        },
    );
    assert_eq!(revenue(&maintenance, Pathway::MedicalMedicare), dec!(742.00));

    // 17 units over 15 fills in year one.
    let year_one = compute_margins(&drug, &MarginConfig::default());
    assert_eq!(revenue(&year_one, Pathway::MedicalMedicare), dec!(840.93));
}

#[test]
fn invalid_dosing_profile_marks_medical_pathways_undeterminable() {
    let mut drug = record(Some(dec!(74.20)), Some(dec!(10)));
    drug.dosing = Some(DosingProfile::maintenance_only(0, dec!(1)));
    let set = compute_margins(&drug, &MarginConfig::default());
    assert!(!set.get(Pathway::MedicalMedicare).is_computed());
    assert!(set.get(Pathway::PharmacyMedicareCommercial).is_computed());
}

#[test]
fn recommendation_picks_best_margin_and_delta() {
    // Pharmacy M/C 750, medical commercial 705, medicare 642, medicaid 628.
    let set = compute_margins(&record(Some(dec!(74.20)), Some(dec!(10))), &MarginConfig::default());
    let rec = set.recommendation().unwrap();
    assert_eq!(rec.pathway, Pathway::PharmacyMedicareCommercial);
    assert_eq!(rec.margin, dec!(750.00));
    assert_eq!(rec.margin_delta, dec!(45.00));
}

#[test]
fn recommendation_ties_go_to_the_earlier_pathway() {
    let computed = |pathway, margin| MarginResult {
        pathway,
        outcome: MarginOutcome::Computed {
            revenue: margin,
            cost:    Decimal::ZERO,
            margin,
        },
    };
    let undeterminable = |pathway| MarginResult {
        pathway,
        outcome: MarginOutcome::Undeterminable { reason: "n/a".into() },
    };
    let set = MarginSet {
        identifier: normalize_identifier("1").unwrap(),
        results: vec![
            undeterminable(Pathway::PharmacyMedicaid),
            computed(Pathway::PharmacyMedicareCommercial, dec!(50)),
            computed(Pathway::MedicalMedicaid, dec!(80)),
            computed(Pathway::MedicalMedicare, dec!(80)),
            undeterminable(Pathway::MedicalCommercial),
        ],
    };
    let rec = set.recommendation().unwrap();
    assert_eq!(rec.pathway, Pathway::MedicalMedicaid);
    assert_eq!(rec.margin_delta, Decimal::ZERO);
}

#[test]
fn single_computed_pathway_reports_its_margin_as_delta() {
    let mut drug = record(None, None);
    drug.crosswalk = None;
    let set = compute_margins(&drug, &MarginConfig::default());
    let rec = set.recommendation().unwrap();
    assert_eq!(rec.pathway, Pathway::PharmacyMedicareCommercial);
    assert_eq!(rec.margin_delta, rec.margin);
}

fn reason(set: &MarginSet, pathway: Pathway) -> String {
    match &set.get(pathway).outcome {
        MarginOutcome::Undeterminable { reason } => reason.clone(),
        other => panic!("{pathway} should be undeterminable, got {other:?}"),
    }
}

#[test]
fn negative_contract_cost_prices_nothing() {
    let mut r = record(Some(dec!(74.20)), Some(dec!(10)));
    r.prices.contract_cost = Some(dec!(-100));
    let set = compute_margins(&r, &MarginConfig::default());

    for pathway in Pathway::ALL {
        assert_eq!(reason(&set, pathway), "negative contract cost");
    }
    assert!(set.recommendation().is_none());
}

#[test]
fn negative_pharmacy_references_block_only_pharmacy_pathways() {
    let mut r = record(Some(dec!(74.20)), Some(dec!(10)));
    r.prices.list_price = Some(dec!(-1000));
    r.prices.acquisition_cost = Some(dec!(-5));
    let set = compute_margins(&r, &MarginConfig::default());

    assert_eq!(reason(&set, Pathway::PharmacyMedicareCommercial), "negative list price");
    assert_eq!(reason(&set, Pathway::PharmacyMedicaid), "negative acquisition cost reference");
    assert_eq!(set.margin(Pathway::MedicalMedicare), Some(dec!(642.00)));
}

#[test]
fn zero_contract_cost_is_a_valid_cost() {
    let mut r = record(Some(dec!(74.20)), Some(dec!(10)));
    r.prices.contract_cost = Some(Decimal::ZERO);
    let set = compute_margins(&r, &MarginConfig::default());
    assert_eq!(set.margin(Pathway::MedicalMedicare), Some(dec!(742.00)));
}

#[test]
fn non_positive_payment_limit_or_units_block_medical_pathways() {
    let negative_limit = compute_margins(&record(Some(dec!(-74.20)), Some(dec!(10))), &MarginConfig::default());
    assert_eq!(reason(&negative_limit, Pathway::MedicalMedicare), "non-positive payment limit");
    assert!(negative_limit.get(Pathway::PharmacyMedicareCommercial).is_computed());

    let negative_units = compute_margins(&record(Some(dec!(74.20)), Some(dec!(-10))), &MarginConfig::default());
    assert_eq!(
        reason(&negative_units, Pathway::MedicalCommercial),
        "non-positive billing units per package"
    );

    let zero_units = compute_margins(&record(Some(dec!(74.20)), Some(Decimal::ZERO)), &MarginConfig::default());
    assert_eq!(reason(&zero_units, Pathway::MedicalMedicaid), "non-positive billing units per package");
}

#[test]
fn noc_priced_record_uses_noc_limit_and_units() {
    let mut r = record(None, None);
    r.crosswalk = None;
    r.apply_noc(&NocPricing {
        generic_name:              "NEWMAB".into(),
        payment_limit:             dec!(10.60),
        billing_units_per_package: dec!(4),
    });
    let set = compute_margins(&r, &MarginConfig::default());

    // 10.60 / 1.06 = 10.00 per unit, × 1.06 × 4 units
    assert_eq!(revenue(&set, Pathway::MedicalMedicare), dec!(42.40));
    assert_eq!(revenue(&set, Pathway::MedicalCommercial), dec!(46.00));
    assert!(r.is_noc);
    assert!(r.billing_code().is_none());
}
