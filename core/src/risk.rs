//! Risk flagger — statutory pricing, penny pricing, inflation penalty and
//! contract-pharmacy restrictions.
//!
//! RULE: Flags are reported alongside the margin. Only penny pricing changes
//! economics (pharmacy cost basis forced to $0.01, excluded from the ranked
//! view); every other flag is a label and never drops a drug from a view.

use crate::{
    config::RiskConfig,
    record::DrugRecord,
    types::{IraYear, Rate},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};

fn normalize_name(raw: &str) -> String {
    raw.trim().to_uppercase()
}

// ── Statutory negotiated-price list ─────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IraDrugEntry {
    pub drug_name:   String,
    pub year:        IraYear,
    #[serde(default)]
    pub description: Option<String>,
}

/// Drugs subject to a negotiated Medicare price, by effective year.
///
/// Partial matches are tried in list order, so the first entry loaded wins.
#[derive(Debug, Clone, Default)]
pub struct IraDrugList {
    entries: Vec<IraDrugEntry>,
    exact:   HashMap<String, usize>,
}

impl IraDrugList {
    pub fn new(entries: impl IntoIterator<Item = IraDrugEntry>) -> Self {
        let mut list = Self::default();
        for entry in entries {
            let name = normalize_name(&entry.drug_name);
            if name.is_empty() || list.exact.contains_key(&name) {
                continue;
            }
            list.exact.insert(name.clone(), list.entries.len());
            list.entries.push(IraDrugEntry { drug_name: name, ..entry });
        }
        list
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact name match first, then containment in either direction.
    pub fn lookup(&self, product_name: &str) -> Option<&IraDrugEntry> {
        let name = normalize_name(product_name);
        if name.is_empty() {
            return None;
        }
        if let Some(&idx) = self.exact.get(&name) {
            return Some(&self.entries[idx]);
        }
        self.entries
            .iter()
            .find(|e| name.contains(e.drug_name.as_str()) || e.drug_name.contains(name.as_str()))
    }
}

// ── Contract-pharmacy restrictions ──────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionLevel {
    None,
    Low,
    Medium,
    High,
}

impl RestrictionLevel {
    /// Level from the share of 340B value a manufacturer's policy preserves.
    pub fn from_coefficient(coefficient: Rate) -> Self {
        if coefficient >= Decimal::ONE {
            RestrictionLevel::None
        } else if coefficient >= dec!(0.85) {
            RestrictionLevel::Low
        } else if coefficient >= dec!(0.70) {
            RestrictionLevel::Medium
        } else {
            RestrictionLevel::High
        }
    }
}

impl fmt::Display for RestrictionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RestrictionLevel::None => "None",
            RestrictionLevel::Low => "Low",
            RestrictionLevel::Medium => "Medium",
            RestrictionLevel::High => "High",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestrictionEntry {
    pub manufacturer:      String,
    #[serde(default)]
    pub restriction_type:  String,
    pub value_coefficient: Rate,
}

#[derive(Debug, Clone, Default)]
pub struct RestrictionTable {
    entries: Vec<RestrictionEntry>,
    exact:   HashMap<String, usize>,
}

impl RestrictionTable {
    pub fn new(entries: impl IntoIterator<Item = RestrictionEntry>) -> Self {
        let mut table = Self::default();
        for entry in entries {
            let key = normalize_name(&entry.manufacturer);
            if key.is_empty() || table.exact.contains_key(&key) {
                continue;
            }
            table.exact.insert(key.clone(), table.entries.len());
            table.entries.push(RestrictionEntry { manufacturer: key, ..entry });
        }
        table
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact match first, then the first key contained in the manufacturer name.
    pub fn lookup(&self, manufacturer: &str) -> Option<&RestrictionEntry> {
        let name = normalize_name(manufacturer);
        if name.is_empty() {
            return None;
        }
        if let Some(&idx) = self.exact.get(&name) {
            return Some(&self.entries[idx]);
        }
        self.entries.iter().find(|e| name.contains(e.manufacturer.as_str()))
    }
}

/// The swappable lookup tables the flagger reads.
#[derive(Debug, Clone, Default)]
pub struct RiskLists {
    pub ira:          IraDrugList,
    pub restrictions: RestrictionTable,
}

// ── Flags ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "year", rename_all = "snake_case")]
pub enum IraFlag {
    #[default]
    None,
    Year(IraYear),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractPharmacyRisk {
    pub manufacturer:      String,
    pub restriction_type:  String,
    pub value_coefficient: Rate,
    pub level:             RestrictionLevel,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskFlags {
    pub ira:               IraFlag,
    pub penny_pricing:     bool,
    /// Set only when the penalty exceeds the configured threshold.
    pub inflation_penalty: Option<Rate>,
    pub contract_pharmacy: Option<ContractPharmacyRisk>,
}

impl RiskFlags {
    pub fn ira_year(&self) -> Option<IraYear> {
        match self.ira {
            IraFlag::Year(year) => Some(year),
            IraFlag::None => None,
        }
    }

    /// Penny-priced drugs stay out of the ranked view.
    pub fn excluded_from_ranking(&self) -> bool {
        self.penny_pricing
    }

    /// Human-readable label for every flag that is set.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(year) = self.ira_year() {
            out.push(format!("High Risk / IRA {year}"));
        }
        if self.penny_pricing {
            out.push("Penny Pricing".to_string());
        }
        if let Some(pct) = self.inflation_penalty {
            out.push(format!("High Inflation Penalty ({pct}%)"));
        }
        if let Some(cp) = &self.contract_pharmacy {
            if cp.level != RestrictionLevel::None {
                out.push(format!("Contract Pharmacy Restriction: {} ({})", cp.level, cp.manufacturer));
            }
        }
        out
    }
}

/// Classify one joined record. Pure; never touches the record's prices.
pub fn classify_risk(record: &DrugRecord, lists: &RiskLists, config: &RiskConfig) -> RiskFlags {
    let ira = match lists.ira.lookup(&record.product_name) {
        Some(entry) => IraFlag::Year(entry.year),
        None => IraFlag::None,
    };

    let acquisition = &record.acquisition;
    let penny_pricing = acquisition.penny_indicator
        || acquisition
            .discount_pct
            .is_some_and(|pct| pct >= config.penny_discount_threshold_pct);

    let inflation_penalty = acquisition
        .inflation_penalty_pct
        .filter(|pct| *pct > config.inflation_penalty_threshold_pct);

    let contract_pharmacy = record
        .manufacturer
        .as_deref()
        .and_then(|m| lists.restrictions.lookup(m))
        .map(|entry| ContractPharmacyRisk {
            manufacturer:      entry.manufacturer.clone(),
            restriction_type:  entry.restriction_type.clone(),
            value_coefficient: entry.value_coefficient,
            level:             RestrictionLevel::from_coefficient(entry.value_coefficient),
        });

    let flags = RiskFlags {
        ira,
        penny_pricing,
        inflation_penalty,
        contract_pharmacy,
    };

    if flags.penny_pricing || flags.ira_year().is_some() {
        log::debug!("risk: {} flagged {:?}", record.identifier, flags.warnings());
    }

    flags
}
