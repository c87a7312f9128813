//! Typed source records and the per-drug join.
//!
//! Records arrive already normalized from the ingestion boundary. The join
//! attaches crosswalk, payment-limit, acquisition and dosing data to each
//! catalog entry and produces one `DrugRecord` per catalog identifier.
//!
//! RULE: A missing join is carried as `None`, never as a zero. The margin
//! engine decides what a gap means for each pathway.
//! RULE: NOC pricing is a fallback. It applies only when the permanent
//! billing code yields no payment limit, and then supplies both the payment
//! limit and the billing units.

use crate::{
    crosswalk::{CrosswalkIndex, CrosswalkRow},
    dosing::DosingProfile,
    identifier::{BillingCode, DrugIdentifier},
    types::{Money, Rate},
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One row of the hospital's drug catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub identifier:    DrugIdentifier,
    pub product_name:  String,
    pub manufacturer:  Option<String>,
    pub is_brand:      bool,
    /// Discounted acquisition cost per package.
    pub contract_cost: Option<Money>,
    /// Average wholesale price per package.
    pub list_price:    Option<Money>,
}

/// Payment limit per billing unit, keyed by billing code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLimitRecord {
    pub code:          BillingCode,
    pub payment_limit: Money,
}

/// Acquisition-cost reference and discount data for one identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionRecord {
    /// National average acquisition cost per package.
    pub acquisition_cost:      Option<Money>,
    /// Discount off list price, in percent.
    pub discount_pct:          Option<Rate>,
    /// The source's explicit penny-pricing indicator.
    pub penny_indicator:       bool,
    pub inflation_penalty_pct: Option<Rate>,
}

/// One row of the NOC crosswalk: a drug without a permanent billing code,
/// mapped to the generic name its NOC payment limit is published under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NocCrosswalkRecord {
    pub identifier:                DrugIdentifier,
    pub generic_name:              String,
    pub billing_units_per_package: Option<Money>,
}

/// NOC payment limit per billing unit, keyed by generic name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NocPaymentRecord {
    pub generic_name:  String,
    pub payment_limit: Money,
}

/// Medical-benefit pricing resolved through the NOC tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NocPricing {
    pub generic_name:              String,
    /// Per billing unit, statutory add-on included.
    pub payment_limit:             Money,
    /// Defaults to one unit when the NOC crosswalk leaves it blank.
    pub billing_units_per_package: Money,
}

/// The four price references a margin is computed from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceBasis {
    pub list_price:       Option<Money>,
    pub acquisition_cost: Option<Money>,
    /// Per billing unit, statutory add-on included.
    pub payment_limit:    Option<Money>,
    pub contract_cost:    Option<Money>,
}

/// A catalog drug joined with every reference the core needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugRecord {
    pub identifier:   DrugIdentifier,
    pub product_name: String,
    pub manufacturer: Option<String>,
    pub is_brand:     bool,
    pub prices:       PriceBasis,
    pub crosswalk:    Option<CrosswalkRow>,
    pub acquisition:  AcquisitionRecord,
    pub dosing:       Option<DosingProfile>,
    /// Priced through the NOC fallback rather than a permanent code.
    #[serde(default)]
    pub is_noc:       bool,
    #[serde(default)]
    pub noc:          Option<NocPricing>,
}

impl DrugRecord {
    /// A record with only catalog data; callers fill in the rest.
    pub fn from_catalog(catalog: &CatalogRecord) -> Self {
        Self {
            identifier:   catalog.identifier.clone(),
            product_name: catalog.product_name.clone(),
            manufacturer: catalog.manufacturer.clone(),
            is_brand:     catalog.is_brand,
            prices: PriceBasis {
                list_price:       catalog.list_price,
                acquisition_cost: None,
                payment_limit:    None,
                contract_cost:    catalog.contract_cost,
            },
            crosswalk:   None,
            acquisition: AcquisitionRecord::default(),
            dosing:      None,
            is_noc:      false,
            noc:         None,
        }
    }

    pub fn billing_code(&self) -> Option<&BillingCode> {
        self.crosswalk.as_ref().map(|row| &row.primary_code)
    }

    /// NOC units when the NOC fallback priced the record, else the crosswalk's.
    pub fn billing_units_per_package(&self) -> Option<Money> {
        match &self.noc {
            Some(noc) if self.is_noc => Some(noc.billing_units_per_package),
            _ => self
                .crosswalk
                .as_ref()
                .and_then(|row| row.attributes.billing_units_per_package),
        }
    }

    /// Whether any source can price the medical-benefit pathways.
    pub fn has_medical_source(&self) -> bool {
        self.crosswalk.is_some() || self.is_noc
    }

    /// Switch medical pricing over to the NOC fallback.
    pub fn apply_noc(&mut self, noc: &NocPricing) {
        self.prices.payment_limit = Some(noc.payment_limit);
        self.is_noc = true;
        self.noc = Some(noc.clone());
    }
}

/// Lookup tables the catalog is joined against.
#[derive(Debug, Clone, Default)]
pub struct JoinSources<'a> {
    pub crosswalk:      Option<&'a CrosswalkIndex>,
    pub payment_limits: HashMap<BillingCode, Money>,
    pub acquisition:    HashMap<DrugIdentifier, AcquisitionRecord>,
    /// Keyed by uppercase product name.
    pub dosing:         HashMap<String, DosingProfile>,
    pub noc:            HashMap<DrugIdentifier, NocPricing>,
}

impl<'a> JoinSources<'a> {
    pub fn with_crosswalk(index: &'a CrosswalkIndex) -> Self {
        Self {
            crosswalk: Some(index),
            ..Self::default()
        }
    }

    /// First payment-limit row per code wins.
    pub fn add_payment_limits(&mut self, rows: &[PaymentLimitRecord]) {
        for row in rows {
            self.payment_limits
                .entry(row.code.clone())
                .or_insert(row.payment_limit);
        }
    }

    /// Resolve NOC identifiers to a payment limit through their generic name.
    ///
    /// Names match trimmed and uppercased. The first row per name and per
    /// identifier wins. Identifiers whose name has no payment limit are
    /// skipped.
    pub fn add_noc(&mut self, crosswalk: &[NocCrosswalkRecord], pricing: &[NocPaymentRecord]) {
        let mut limits: HashMap<String, Money> = HashMap::new();
        for row in pricing {
            limits
                .entry(noc_name_key(&row.generic_name))
                .or_insert(row.payment_limit);
        }

        let mut unpriced = 0usize;
        for row in crosswalk {
            let generic_name = noc_name_key(&row.generic_name);
            let Some(&payment_limit) = limits.get(&generic_name) else {
                unpriced += 1;
                continue;
            };
            self.noc
                .entry(row.identifier.clone())
                .or_insert_with(|| NocPricing {
                    generic_name,
                    payment_limit,
                    billing_units_per_package: row
                        .billing_units_per_package
                        .unwrap_or(Money::ONE),
                });
        }

        log::info!(
            "join: {} NOC identifiers priced ({} without a NOC payment limit)",
            self.noc.len(),
            unpriced
        );
    }
}

fn noc_name_key(name: &str) -> String {
    name.trim().to_uppercase()
}

/// Join every catalog record against the lookup tables.
///
/// Duplicate catalog identifiers keep their first row. Output follows
/// catalog order.
pub fn join_records(catalog: &[CatalogRecord], sources: &JoinSources<'_>) -> Vec<DrugRecord> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(catalog.len());

    for entry in catalog {
        if !seen.insert(&entry.identifier) {
            log::debug!("join: duplicate catalog identifier {} skipped", entry.identifier);
            continue;
        }

        let mut record = DrugRecord::from_catalog(entry);

        record.crosswalk = sources
            .crosswalk
            .and_then(|index| index.get(&entry.identifier))
            .cloned();

        record.prices.payment_limit = record
            .billing_code()
            .and_then(|code| sources.payment_limits.get(code))
            .copied();

        if record.prices.payment_limit.is_none() {
            if let Some(noc) = sources.noc.get(&entry.identifier) {
                record.apply_noc(noc);
            }
        }

        if let Some(acquisition) = sources.acquisition.get(&entry.identifier) {
            record.prices.acquisition_cost = acquisition.acquisition_cost;
            record.acquisition = acquisition.clone();
        }

        record.dosing = sources
            .dosing
            .get(&entry.product_name.trim().to_uppercase())
            .cloned();

        out.push(record);
    }

    let with_crosswalk = out.iter().filter(|r| r.crosswalk.is_some()).count();
    let with_noc = out.iter().filter(|r| r.is_noc).count();
    log::info!(
        "join: {} drug records ({} with a billing code, {} priced via NOC)",
        out.len(),
        with_crosswalk,
        with_noc
    );

    out
}
