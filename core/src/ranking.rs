//! Opportunity ranker — blended expected margin per drug.
//!
//!   blended = Σ pharmacy(margin × weight) × capture_rate
//!           + Σ medical(margin × weight)
//!
//! RULE: Capture rate discounts only the pharmacy (retail) side. Medical
//! contributions are never scaled by it.
//! RULE: Undeterminable pathways contribute nothing; `coverage` is the
//! payer-mix weight that was actually priced. Zero coverage means no blend.

use crate::{
    config::{validate_capture_rate, PayerMix},
    crosswalk::CrosswalkRow,
    dosing::ResolvedUnits,
    error::CoreResult,
    identifier::DrugIdentifier,
    margin::{MarginSet, Pathway},
    risk::RiskFlags,
    types::{Money, Rate},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Everything computed for one drug before payer-mix weighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugAssessment {
    pub identifier:   DrugIdentifier,
    pub product_name: String,
    pub crosswalk:    Option<CrosswalkRow>,
    #[serde(default)]
    pub is_noc:       bool,
    pub dosing:       Option<ResolvedUnits>,
    pub margins:      MarginSet,
    pub flags:        RiskFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub pathway: Pathway,
    pub weight:  Rate,
    /// Weighted margin; `None` when the pathway is undeterminable.
    pub value:   Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blend {
    pub contributions:        Vec<Contribution>,
    pub retail_contribution:  Money,
    pub medical_contribution: Money,
    pub coverage:             Rate,
    pub blended_margin:       Option<Money>,
}

/// Weight a margin set by payer mix and capture rate.
pub fn blend(margins: &MarginSet, payer_mix: &PayerMix, capture_rate: Rate) -> Blend {
    let weights = payer_mix.weights();
    let mut retail = Decimal::ZERO;
    let mut medical = Decimal::ZERO;
    let mut coverage = Decimal::ZERO;

    let contributions = Pathway::ALL
        .iter()
        .map(|&pathway| {
            let weight = weights[pathway.index()];
            let value = margins.margin(pathway).map(|margin| {
                coverage += weight;
                if pathway.is_pharmacy() {
                    let weighted = margin * weight * capture_rate;
                    retail += weighted;
                    weighted
                } else {
                    let weighted = margin * weight;
                    medical += weighted;
                    weighted
                }
            });
            Contribution { pathway, weight, value }
        })
        .collect();

    let blended_margin = (coverage > Decimal::ZERO).then_some(retail + medical);

    Blend {
        contributions,
        retail_contribution: retail,
        medical_contribution: medical,
        coverage,
        blended_margin,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityRecord {
    pub identifier:   DrugIdentifier,
    pub product_name: String,
    pub crosswalk:    Option<CrosswalkRow>,
    #[serde(default)]
    pub is_noc:       bool,
    pub dosing:       Option<ResolvedUnits>,
    pub margins:      MarginSet,
    pub flags:        RiskFlags,
    pub warnings:     Vec<String>,
    pub blend:        Blend,
}

impl OpportunityRecord {
    pub fn blended_margin(&self) -> Option<Money> {
        self.blend.blended_margin
    }

    pub fn is_rankable(&self) -> bool {
        self.blend.blended_margin.is_some() && !self.flags.excluded_from_ranking()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    /// Rankable records, best blended margin first.
    pub ranked: Vec<OpportunityRecord>,
    /// Every record, in input order.
    pub all:    Vec<OpportunityRecord>,
}

/// Blend and order a batch of assessed drugs.
pub fn rank_opportunities(
    assessments: &[DrugAssessment],
    payer_mix: &PayerMix,
    capture_rate: Rate,
) -> CoreResult<Ranking> {
    payer_mix.validate()?;
    validate_capture_rate(capture_rate)?;

    let all: Vec<OpportunityRecord> = assessments
        .iter()
        .map(|a| OpportunityRecord {
            identifier:   a.identifier.clone(),
            product_name: a.product_name.clone(),
            crosswalk:    a.crosswalk.clone(),
            is_noc:       a.is_noc,
            dosing:       a.dosing.clone(),
            margins:      a.margins.clone(),
            flags:        a.flags.clone(),
            warnings:     a.flags.warnings(),
            blend:        blend(&a.margins, payer_mix, capture_rate),
        })
        .collect();

    let mut ranked: Vec<OpportunityRecord> =
        all.iter().filter(|r| r.is_rankable()).cloned().collect();
    ranked.sort_by(compare_ranked);

    log::info!(
        "ranking: {} ranked of {} records at {capture_rate} capture ({} excluded)",
        ranked.len(),
        all.len(),
        all.len() - ranked.len()
    );

    Ok(Ranking { ranked, all })
}

fn compare_ranked(a: &OpportunityRecord, b: &OpportunityRecord) -> Ordering {
    b.blended_margin()
        .cmp(&a.blended_margin())
        .then_with(|| a.identifier.cmp(&b.identifier))
}

/// The first `n` ranked records.
pub fn top_opportunities(ranking: &Ranking, n: usize) -> &[OpportunityRecord] {
    &ranking.ranked[..n.min(ranking.ranked.len())]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityPoint {
    pub capture_rate:         Rate,
    pub retail_contribution:  Money,
    pub medical_contribution: Money,
    pub blended_margin:       Option<Money>,
}

/// Recompute the blend at each capture rate. Rates outside [0, 1] are errors.
pub fn capture_sensitivity(
    margins: &MarginSet,
    payer_mix: &PayerMix,
    rates: &[Rate],
) -> CoreResult<Vec<SensitivityPoint>> {
    rates
        .iter()
        .map(|&rate| {
            validate_capture_rate(rate)?;
            let b = blend(margins, payer_mix, rate);
            Ok(SensitivityPoint {
                capture_rate:         rate,
                retail_contribution:  b.retail_contribution,
                medical_contribution: b.medical_contribution,
                blended_margin:       b.blended_margin,
            })
        })
        .collect()
}
