//! The batch pipeline — wires every stage for one optimization run.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Normalize identifiers and billing codes in every source table
//!   2. Build the crosswalk and check catalog coverage
//!   3. Join catalog records with crosswalk, pricing and dosing data,
//!      falling back to NOC pricing where the permanent code has none
//!   4. Classify risk
//!   5. Compute margins with the risk overrides applied
//!   6. Blend and rank
//!   7. Validate calculated retail prices against market prices
//!
//! RULES:
//!   - The pipeline holds no state between runs.
//!   - Malformed rows are dropped and counted, never fatal.
//!   - Negative prices and non-positive payment limits or billing units are
//!     cleared (or their row dropped) and counted as invalid amounts.
//!   - The same inputs and config always produce the same output.

use crate::{
    config::EngineConfig,
    crosswalk::{
        build_crosswalk, crosswalk_integrity, CrosswalkAttributes, CrosswalkIndex, CrosswalkRow,
        CrosswalkSourceRow, IntegrityReport,
    },
    dosing::{resolve_billing_units, DosingProfile},
    error::CoreResult,
    identifier::{normalize_billing_code, normalize_identifier, DrugIdentifier},
    margin::{compute_margins_with_flags, Pathway},
    ranking::{rank_opportunities, DrugAssessment, Ranking},
    record::{
        join_records, AcquisitionRecord, CatalogRecord, JoinSources, NocCrosswalkRecord,
        NocPaymentRecord, PaymentLimitRecord,
    },
    risk::{classify_risk, RiskLists},
    types::{Money, Rate},
    validation::{validate_retail, RetailValidation},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Raw input rows (as handed over by ingestion) ────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCatalogRow {
    pub identifier:    String,
    pub product_name:  String,
    pub manufacturer:  Option<String>,
    pub is_brand:      bool,
    pub contract_cost: Option<Money>,
    pub list_price:    Option<Money>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCrosswalkRow {
    pub identifier:   String,
    pub billing_code: String,
    pub attributes:   CrosswalkAttributes,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPaymentLimitRow {
    pub billing_code:  String,
    pub payment_limit: Money,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAcquisitionRow {
    pub identifier:            String,
    pub acquisition_cost:      Option<Money>,
    pub discount_pct:          Option<Rate>,
    pub penny_indicator:       bool,
    pub inflation_penalty_pct: Option<Rate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRetailPriceRow {
    pub identifier:    String,
    pub actual_retail: Money,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawNocCrosswalkRow {
    pub identifier:                String,
    pub generic_name:              String,
    pub billing_units_per_package: Option<Money>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawNocPaymentRow {
    pub generic_name:  String,
    pub payment_limit: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedDosingProfile {
    pub drug_name: String,
    pub profile:   DosingProfile,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    pub catalog:        Vec<RawCatalogRow>,
    pub crosswalk:      Vec<RawCrosswalkRow>,
    pub payment_limits: Vec<RawPaymentLimitRow>,
    pub acquisition:    Vec<RawAcquisitionRow>,
    pub retail_prices:  Vec<RawRetailPriceRow>,
    pub dosing:         Vec<NamedDosingProfile>,
    pub noc_crosswalk:  Vec<RawNocCrosswalkRow>,
    pub noc_pricing:    Vec<RawNocPaymentRow>,
    pub risk_lists:     RiskLists,
}

// ── Output ──────────────────────────────────────────────────────────

/// Rows dropped at each stage of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub catalog_rows:                  usize,
    pub rejected_catalog_identifiers:  usize,
    pub rejected_crosswalk_rows:       usize,
    pub rejected_payment_limit_codes:  usize,
    pub rejected_acquisition_rows:     usize,
    pub rejected_retail_price_rows:    usize,
    pub invalid_dosing_profiles:       usize,
    pub rejected_noc_rows:             usize,
    /// Negative prices and non-positive limits or units.
    pub invalid_amounts:               usize,
    pub drug_records:                  usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetailCheck {
    pub identifier: DrugIdentifier,
    pub validation: RetailValidation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub crosswalk:     Vec<CrosswalkRow>,
    pub integrity:     IntegrityReport,
    pub ranking:       Ranking,
    pub retail_checks: Vec<RetailCheck>,
    pub stats:         PipelineStats,
}

pub struct Pipeline;

impl Pipeline {
    /// Run every stage over one batch. Fails only on invalid configuration.
    pub fn run(inputs: &PipelineInputs, config: &EngineConfig) -> CoreResult<PipelineOutput> {
        config.validate()?;
        let mut stats = PipelineStats {
            catalog_rows: inputs.catalog.len(),
            ..PipelineStats::default()
        };

        // 1. Normalize
        let catalog = normalize_catalog(&inputs.catalog, &mut stats);
        let crosswalk_rows = normalize_crosswalk(&inputs.crosswalk, &mut stats);

        // 2. Crosswalk
        let crosswalk = build_crosswalk(&crosswalk_rows);
        let index = CrosswalkIndex::new(crosswalk.clone());
        let integrity = crosswalk_integrity(
            catalog.iter().map(|c| &c.identifier),
            &index,
            config.quality.min_crosswalk_match_rate,
        );

        // 3. Join
        let mut sources = JoinSources::with_crosswalk(&index);
        sources.add_payment_limits(&normalize_payment_limits(&inputs.payment_limits, &mut stats));
        sources.acquisition = normalize_acquisition(&inputs.acquisition, &mut stats);
        sources.dosing = collect_dosing(&inputs.dosing, &mut stats);
        if !inputs.noc_crosswalk.is_empty() && !inputs.noc_pricing.is_empty() {
            let noc_crosswalk = normalize_noc_crosswalk(&inputs.noc_crosswalk, &mut stats);
            let noc_pricing = normalize_noc_pricing(&inputs.noc_pricing, &mut stats);
            sources.add_noc(&noc_crosswalk, &noc_pricing);
        }
        let records = join_records(&catalog, &sources);
        stats.drug_records = records.len();

        // 4-5. Risk, then margins with overrides
        let assessments: Vec<DrugAssessment> = records
            .iter()
            .map(|record| {
                let flags = classify_risk(record, &inputs.risk_lists, &config.risk);
                let margins = compute_margins_with_flags(record, &flags, &config.margin);
                let dosing = record
                    .dosing
                    .as_ref()
                    .and_then(|p| resolve_billing_units(p).ok());
                DrugAssessment {
                    identifier:   record.identifier.clone(),
                    product_name: record.product_name.clone(),
                    crosswalk:    record.crosswalk.clone(),
                    is_noc:       record.is_noc,
                    dosing,
                    margins,
                    flags,
                }
            })
            .collect();

        // 6. Rank
        let ranking = rank_opportunities(
            &assessments,
            &config.ranking.payer_mix,
            config.ranking.capture_rate,
        )?;

        // 7. Retail validation
        let actual_retail = normalize_retail_prices(&inputs.retail_prices, &mut stats);
        let retail_checks = assessments
            .iter()
            .filter_map(|a| {
                let actual = actual_retail.get(&a.identifier).copied()?;
                let calculated = a.margins.get(Pathway::PharmacyMedicareCommercial).revenue();
                Some(RetailCheck {
                    identifier: a.identifier.clone(),
                    validation: validate_retail(
                        calculated,
                        Some(actual),
                        config.quality.retail_variance_threshold,
                    ),
                })
            })
            .collect();

        log::info!(
            "pipeline: {} catalog rows -> {} drug records, {} ranked",
            stats.catalog_rows,
            stats.drug_records,
            ranking.ranked.len()
        );

        Ok(PipelineOutput {
            crosswalk,
            integrity,
            ranking,
            retail_checks,
            stats,
        })
    }
}

// ── Normalization helpers ───────────────────────────────────────────

fn normalize_catalog(rows: &[RawCatalogRow], stats: &mut PipelineStats) -> Vec<CatalogRecord> {
    rows.iter()
        .filter_map(|row| match normalize_identifier(&row.identifier) {
            Some(identifier) => Some(CatalogRecord {
                product_name:  row.product_name.trim().to_string(),
                manufacturer:  row.manufacturer.clone(),
                is_brand:      row.is_brand,
                contract_cost: non_negative(row.contract_cost, "contract cost", &identifier, stats),
                list_price:    non_negative(row.list_price, "list price", &identifier, stats),
                identifier,
            }),
            None => {
                log::debug!("pipeline: catalog identifier {:?} rejected", row.identifier);
                stats.rejected_catalog_identifiers += 1;
                None
            }
        })
        .collect()
}

fn normalize_crosswalk(rows: &[RawCrosswalkRow], stats: &mut PipelineStats) -> Vec<CrosswalkSourceRow> {
    rows.iter()
        .filter_map(|row| {
            let identifier = normalize_identifier(&row.identifier);
            let code = normalize_billing_code(&row.billing_code);
            match (identifier, code) {
                (Some(identifier), Some(code)) => {
                    let mut attributes = row.attributes.clone();
                    attributes.billing_units_per_package = positive(
                        attributes.billing_units_per_package,
                        "billing units per package",
                        &identifier,
                        stats,
                    );
                    Some(CrosswalkSourceRow {
                        identifier,
                        code,
                        attributes,
                    })
                }
                _ => {
                    log::debug!(
                        "pipeline: crosswalk row {:?}/{:?} rejected",
                        row.identifier,
                        row.billing_code
                    );
                    stats.rejected_crosswalk_rows += 1;
                    None
                }
            }
        })
        .collect()
}

fn normalize_payment_limits(rows: &[RawPaymentLimitRow], stats: &mut PipelineStats) -> Vec<PaymentLimitRecord> {
    rows.iter()
        .filter_map(|row| match normalize_billing_code(&row.billing_code) {
            Some(code) if row.payment_limit <= Money::ZERO => {
                log::debug!("pipeline: payment limit {} for {code} rejected", row.payment_limit);
                stats.invalid_amounts += 1;
                None
            }
            Some(code) => Some(PaymentLimitRecord {
                code,
                payment_limit: row.payment_limit,
            }),
            None => {
                log::debug!("pipeline: payment-limit code {:?} rejected", row.billing_code);
                stats.rejected_payment_limit_codes += 1;
                None
            }
        })
        .collect()
}

/// First row per identifier wins.
fn normalize_acquisition(
    rows: &[RawAcquisitionRow],
    stats: &mut PipelineStats,
) -> HashMap<DrugIdentifier, AcquisitionRecord> {
    let mut out = HashMap::new();
    for row in rows {
        let Some(identifier) = normalize_identifier(&row.identifier) else {
            log::debug!("pipeline: acquisition identifier {:?} rejected", row.identifier);
            stats.rejected_acquisition_rows += 1;
            continue;
        };
        if out.contains_key(&identifier) {
            continue;
        }
        let acquisition_cost =
            non_negative(row.acquisition_cost, "acquisition cost", &identifier, stats);
        out.insert(identifier, AcquisitionRecord {
            acquisition_cost,
            discount_pct:          row.discount_pct,
            penny_indicator:       row.penny_indicator,
            inflation_penalty_pct: row.inflation_penalty_pct,
        });
    }
    out
}

fn normalize_retail_prices(
    rows: &[RawRetailPriceRow],
    stats: &mut PipelineStats,
) -> HashMap<DrugIdentifier, Money> {
    let mut out = HashMap::new();
    for row in rows {
        match normalize_identifier(&row.identifier) {
            Some(_) if row.actual_retail < Money::ZERO => stats.invalid_amounts += 1,
            Some(identifier) => {
                out.entry(identifier).or_insert(row.actual_retail);
            }
            None => stats.rejected_retail_price_rows += 1,
        }
    }
    out
}

/// Valid profiles keyed by uppercase drug name; first entry per name wins.
fn collect_dosing(
    profiles: &[NamedDosingProfile],
    stats: &mut PipelineStats,
) -> HashMap<String, DosingProfile> {
    let mut out = HashMap::new();
    for named in profiles {
        if let Err(e) = named.profile.validate() {
            log::warn!("pipeline: dosing profile for {} dropped: {e}", named.drug_name);
            stats.invalid_dosing_profiles += 1;
            continue;
        }
        out.entry(named.drug_name.trim().to_uppercase())
            .or_insert_with(|| named.profile.clone());
    }
    out
}

fn normalize_noc_crosswalk(
    rows: &[RawNocCrosswalkRow],
    stats: &mut PipelineStats,
) -> Vec<NocCrosswalkRecord> {
    rows.iter()
        .filter_map(|row| {
            let identifier = normalize_identifier(&row.identifier);
            match identifier {
                Some(identifier) if !row.generic_name.trim().is_empty() => {
                    let units = row.billing_units_per_package;
                    if units.is_some_and(|u| u <= Money::ZERO) {
                        log::debug!("pipeline: NOC units for {identifier} rejected");
                        stats.invalid_amounts += 1;
                        return None;
                    }
                    Some(NocCrosswalkRecord {
                        identifier,
                        generic_name:              row.generic_name.clone(),
                        billing_units_per_package: units,
                    })
                }
                _ => {
                    log::debug!(
                        "pipeline: NOC crosswalk row {:?}/{:?} rejected",
                        row.identifier,
                        row.generic_name
                    );
                    stats.rejected_noc_rows += 1;
                    None
                }
            }
        })
        .collect()
}

fn normalize_noc_pricing(rows: &[RawNocPaymentRow], stats: &mut PipelineStats) -> Vec<NocPaymentRecord> {
    rows.iter()
        .filter_map(|row| {
            if row.generic_name.trim().is_empty() {
                stats.rejected_noc_rows += 1;
                return None;
            }
            if row.payment_limit <= Money::ZERO {
                log::debug!("pipeline: NOC payment limit for {:?} rejected", row.generic_name);
                stats.invalid_amounts += 1;
                return None;
            }
            Some(NocPaymentRecord {
                generic_name:  row.generic_name.clone(),
                payment_limit: row.payment_limit,
            })
        })
        .collect()
}

// ── Amount checks ───────────────────────────────────────────────────

/// Clears a negative amount; zero is a valid price.
fn non_negative(
    value: Option<Money>,
    what: &str,
    identifier: &DrugIdentifier,
    stats: &mut PipelineStats,
) -> Option<Money> {
    match value {
        Some(v) if v < Money::ZERO => {
            log::debug!("pipeline: negative {what} {v} for {identifier} cleared");
            stats.invalid_amounts += 1;
            None
        }
        other => other,
    }
}

/// Clears a quantity at or below zero.
fn positive(
    value: Option<Money>,
    what: &str,
    identifier: &DrugIdentifier,
    stats: &mut PipelineStats,
) -> Option<Money> {
    match value {
        Some(v) if v <= Money::ZERO => {
            log::debug!("pipeline: non-positive {what} {v} for {identifier} cleared");
            stats.invalid_amounts += 1;
            None
        }
        other => other,
    }
}
