//! Crosswalk builder — one billing-code mapping per drug identifier.
//!
//! The source crosswalk lists one row per (identifier, code) pair and may
//! repeat an identifier under several codes. The builder collapses each
//! identifier to a single row.
//!
//! RULE: The primary row is the first row of the group in source order.
//! Source order is carried as an explicit index, never inferred from
//! container iteration order.

use crate::{
    identifier::{normalize_billing_code, BillingCode, DrugIdentifier},
    types::Money,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Separator used when alternate codes are persisted as one column.
pub const ALTERNATE_CODE_SEPARATOR: &str = "|";

/// Maximum orphan identifiers sampled into an integrity report.
const ORPHAN_SAMPLE_SIZE: usize = 10;

/// Descriptive, non-key columns carried from the primary source row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrosswalkAttributes {
    pub description:             Option<String>,
    pub product_name:            Option<String>,
    pub manufacturer:            Option<String>,
    pub dosage:                  Option<String>,
    pub package_size:            Option<Money>,
    pub package_quantity:        Option<Money>,
    pub billing_units_per_item:  Option<Money>,
    pub billing_units_per_package: Option<Money>,
}

/// One already-normalized row of the drug-to-billing-code source.
#[derive(Debug, Clone, PartialEq)]
pub struct CrosswalkSourceRow {
    pub identifier: DrugIdentifier,
    pub code:       BillingCode,
    pub attributes: CrosswalkAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrosswalkRow {
    pub identifier:         DrugIdentifier,
    pub primary_code:       BillingCode,
    pub has_multiple_codes: bool,
    /// Sorted, de-duplicated; empty unless `has_multiple_codes`.
    /// Persisted pipe-joined.
    #[serde(serialize_with = "serialize_joined", deserialize_with = "deserialize_joined")]
    pub alternate_codes:    Vec<BillingCode>,
    #[serde(flatten)]
    pub attributes:         CrosswalkAttributes,
}

impl CrosswalkRow {
    /// The persisted form of `alternate_codes`: pipe-joined, or empty.
    pub fn alternate_codes_joined(&self) -> String {
        join_codes(&self.alternate_codes)
    }
}

fn join_codes(codes: &[BillingCode]) -> String {
    codes
        .iter()
        .map(BillingCode::as_str)
        .collect::<Vec<_>>()
        .join(ALTERNATE_CODE_SEPARATOR)
}

fn serialize_joined<S>(codes: &[BillingCode], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&join_codes(codes))
}

fn deserialize_joined<'de, D>(deserializer: D) -> Result<Vec<BillingCode>, D::Error>
where
    D: Deserializer<'de>,
{
    let joined = String::deserialize(deserializer)?;
    Ok(joined
        .split(ALTERNATE_CODE_SEPARATOR)
        .filter_map(normalize_billing_code)
        .collect())
}

/// Collapse source rows into one `CrosswalkRow` per identifier.
///
/// Output follows the order in which identifiers first appear.
pub fn build_crosswalk(rows: &[CrosswalkSourceRow]) -> Vec<CrosswalkRow> {
    // identifier -> (index of primary row, distinct codes)
    let mut groups: HashMap<&DrugIdentifier, (usize, BTreeSet<&BillingCode>)> = HashMap::new();
    let mut first_seen: Vec<&DrugIdentifier> = Vec::new();

    for (source_index, row) in rows.iter().enumerate() {
        let (_, codes) = groups.entry(&row.identifier).or_insert_with(|| {
            first_seen.push(&row.identifier);
            (source_index, BTreeSet::new())
        });
        codes.insert(&row.code);
    }

    let mut out = Vec::with_capacity(first_seen.len());
    let mut multi_mapped = 0usize;

    for identifier in first_seen {
        let (primary_index, codes) = &groups[identifier];
        let primary = &rows[*primary_index];
        let has_multiple_codes = codes.len() > 1;

        let alternate_codes = if has_multiple_codes {
            multi_mapped += 1;
            codes.iter().map(|c| (*c).clone()).collect()
        } else {
            Vec::new()
        };

        out.push(CrosswalkRow {
            identifier: identifier.clone(),
            primary_code: primary.code.clone(),
            has_multiple_codes,
            alternate_codes,
            attributes: primary.attributes.clone(),
        });
    }

    log::info!(
        "crosswalk: {} source rows -> {} identifiers ({} multi-mapped)",
        rows.len(),
        out.len(),
        multi_mapped
    );

    out
}

/// Lookup over a built crosswalk, keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct CrosswalkIndex {
    rows: HashMap<DrugIdentifier, CrosswalkRow>,
}

impl CrosswalkIndex {
    pub fn new(rows: Vec<CrosswalkRow>) -> Self {
        Self {
            rows: rows.into_iter().map(|r| (r.identifier.clone(), r)).collect(),
        }
    }

    pub fn get(&self, identifier: &DrugIdentifier) -> Option<&CrosswalkRow> {
        self.rows.get(identifier)
    }

    pub fn contains(&self, identifier: &DrugIdentifier) -> bool {
        self.rows.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub total:          usize,
    pub matched:        usize,
    pub unmatched:      usize,
    pub match_rate:     f64,
    pub min_match_rate: f64,
    pub passed:         bool,
    pub sample_orphans: Vec<DrugIdentifier>,
}

/// Share of distinct catalog identifiers that have a crosswalk entry.
///
/// An empty catalog has a match rate of 0 and fails.
pub fn crosswalk_integrity<'a, I>(
    catalog_ids: I,
    index: &CrosswalkIndex,
    min_match_rate: f64,
) -> IntegrityReport
where
    I: IntoIterator<Item = &'a DrugIdentifier>,
{
    let mut seen = HashSet::new();
    let mut matched = 0usize;
    let mut orphans = Vec::new();

    for id in catalog_ids {
        if !seen.insert(id) {
            continue;
        }
        if index.contains(id) {
            matched += 1;
        } else {
            orphans.push(id.clone());
        }
    }

    let total = seen.len();
    let match_rate = if total > 0 { matched as f64 / total as f64 } else { 0.0 };
    let passed = total > 0 && match_rate >= min_match_rate;

    if passed {
        log::info!("crosswalk: integrity OK, {matched}/{total} identifiers matched ({:.1}%)", match_rate * 100.0);
    } else {
        log::warn!(
            "crosswalk: match rate {:.1}% below {:.0}% ({} identifiers without a billing code)",
            match_rate * 100.0,
            min_match_rate * 100.0,
            orphans.len()
        );
    }

    let unmatched = orphans.len();
    orphans.truncate(ORPHAN_SAMPLE_SIZE);

    IntegrityReport {
        total,
        matched,
        unmatched,
        match_rate,
        min_match_rate,
        passed,
        sample_orphans: orphans,
    }
}
