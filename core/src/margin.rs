//! Margin engine — revenue, cost and margin for the five pathways.
//!
//! Two pharmacy-benefit pathways are priced off package references (NADAC,
//! AWP). Three medical-benefit pathways are priced off the per-unit payment
//! limit after stripping its statutory add-on:
//!
//!   true_basis = payment_limit / 1.06
//!   revenue    = true_basis × pathway multiplier × billing units
//!
//! RULE: The back-calculation happens once per record; each medical pathway
//! applies its own multiplier on top of the same basis.
//! RULE: A pathway with a missing input is `Undeterminable`, never zero.
//! RULE: Negative prices, and payment limits or billing units at or below
//! zero, are `Undeterminable` too.

use crate::{
    config::{DosingBasis, MarginConfig},
    dosing::resolve_billing_units,
    identifier::DrugIdentifier,
    record::DrugRecord,
    risk::RiskFlags,
    types::{Money, Rate},
};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The add-on already embedded in a published payment limit.
pub const STATUTORY_ADD_ON: Rate = dec!(1.06);

/// Pharmacy cost basis once penny pricing applies.
pub const PENNY_COST: Money = dec!(0.01);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pathway {
    PharmacyMedicaid,
    PharmacyMedicareCommercial,
    MedicalMedicaid,
    MedicalMedicare,
    MedicalCommercial,
}

impl Pathway {
    /// Declaration order; also the recommendation tie-break order.
    pub const ALL: [Pathway; 5] = [
        Pathway::PharmacyMedicaid,
        Pathway::PharmacyMedicareCommercial,
        Pathway::MedicalMedicaid,
        Pathway::MedicalMedicare,
        Pathway::MedicalCommercial,
    ];

    pub fn is_pharmacy(self) -> bool {
        matches!(self, Pathway::PharmacyMedicaid | Pathway::PharmacyMedicareCommercial)
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Pathway::PharmacyMedicaid => "Pharmacy - Medicaid",
            Pathway::PharmacyMedicareCommercial => "Pharmacy - Medicare/Commercial",
            Pathway::MedicalMedicaid => "Medical - Medicaid",
            Pathway::MedicalMedicare => "Medical - Medicare",
            Pathway::MedicalCommercial => "Medical - Commercial",
        }
    }
}

impl fmt::Display for Pathway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MarginOutcome {
    Computed {
        revenue: Money,
        cost:    Money,
        margin:  Money,
    },
    Undeterminable {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginResult {
    pub pathway: Pathway,
    #[serde(flatten)]
    pub outcome: MarginOutcome,
}

impl MarginResult {
    pub fn margin(&self) -> Option<Money> {
        match self.outcome {
            MarginOutcome::Computed { margin, .. } => Some(margin),
            MarginOutcome::Undeterminable { .. } => None,
        }
    }

    pub fn revenue(&self) -> Option<Money> {
        match self.outcome {
            MarginOutcome::Computed { revenue, .. } => Some(revenue),
            MarginOutcome::Undeterminable { .. } => None,
        }
    }

    pub fn cost(&self) -> Option<Money> {
        match self.outcome {
            MarginOutcome::Computed { cost, .. } => Some(cost),
            MarginOutcome::Undeterminable { .. } => None,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self.outcome, MarginOutcome::Computed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub pathway:      Pathway,
    pub margin:       Money,
    /// Lead over the runner-up, or the margin itself when nothing else computed.
    pub margin_delta: Money,
}

/// All five results for one drug, in `Pathway::ALL` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginSet {
    pub identifier: DrugIdentifier,
    pub results:    Vec<MarginResult>,
}

impl MarginSet {
    pub fn get(&self, pathway: Pathway) -> &MarginResult {
        &self.results[pathway.index()]
    }

    pub fn margin(&self, pathway: Pathway) -> Option<Money> {
        self.get(pathway).margin()
    }

    /// Highest computed margin; ties go to the earlier pathway.
    pub fn recommendation(&self) -> Option<Recommendation> {
        let mut best: Option<(Pathway, Money)> = None;
        let mut second: Option<Money> = None;

        for result in &self.results {
            let Some(margin) = result.margin() else { continue };
            match best {
                Some((_, top)) if margin <= top => {
                    if second.map_or(true, |s| margin > s) {
                        second = Some(margin);
                    }
                }
                _ => {
                    second = best.map(|(_, top)| top);
                    best = Some((result.pathway, margin));
                }
            }
        }

        best.map(|(pathway, margin)| Recommendation {
            pathway,
            margin,
            margin_delta: second.map_or(margin, |s| margin - s),
        })
    }
}

/// The per-unit basis before any pathway multiplier.
pub fn true_payment_basis(payment_limit: Money) -> Money {
    payment_limit / STATUTORY_ADD_ON
}

/// Compute all five pathways with no risk override.
pub fn compute_margins(record: &DrugRecord, config: &MarginConfig) -> MarginSet {
    compute_margins_with_flags(record, &RiskFlags::default(), config)
}

/// Compute all five pathways, applying the penny-pricing cost override.
pub fn compute_margins_with_flags(
    record: &DrugRecord,
    flags: &RiskFlags,
    config: &MarginConfig,
) -> MarginSet {
    let scale = config.currency_scale;
    let prices = &record.prices;

    let medical_cost = non_negative(prices.contract_cost, "contract cost");
    let pharmacy_cost = if flags.penny_pricing {
        Ok(PENNY_COST)
    } else {
        medical_cost.clone()
    };

    // Pharmacy - Medicaid
    let pharmacy_medicaid = non_negative(prices.acquisition_cost, "acquisition cost reference")
        .map(|nadac| (nadac + config.dispense_fee) * (Decimal::ONE + config.medicaid_markup_pct));

    // Pharmacy - Medicare/Commercial
    let awp_factor = if record.is_brand {
        config.retail_brand_pct
    } else {
        config.retail_generic_pct
    };
    let pharmacy_medicare_commercial =
        non_negative(prices.list_price, "list price").map(|awp| awp * awp_factor);

    // Medical pathways share one basis and one unit count.
    let medical = medical_inputs(record, config);
    let medical_revenue = |multiplier: Rate| -> Result<Money, String> {
        medical
            .clone()
            .map(|(basis, units)| basis * multiplier * units)
    };

    let revenues: [(Pathway, Result<Money, String>); 5] = [
        (Pathway::PharmacyMedicaid, pharmacy_medicaid),
        (Pathway::PharmacyMedicareCommercial, pharmacy_medicare_commercial),
        (Pathway::MedicalMedicaid, medical_revenue(config.medicaid_multiplier)),
        (Pathway::MedicalMedicare, medical_revenue(config.medicare_multiplier)),
        (Pathway::MedicalCommercial, medical_revenue(config.commercial_multiplier)),
    ];

    let results = revenues
        .into_iter()
        .map(|(pathway, revenue)| {
            let cost = if pathway.is_pharmacy() { &pharmacy_cost } else { &medical_cost };
            let outcome = match (revenue, cost) {
                (_, Err(reason)) => MarginOutcome::Undeterminable {
                    reason: reason.clone(),
                },
                (Err(reason), Ok(_)) => MarginOutcome::Undeterminable { reason },
                (Ok(revenue), Ok(cost)) => {
                    let revenue = round_money(revenue, scale);
                    let cost = round_money(*cost, scale);
                    MarginOutcome::Computed {
                        revenue,
                        cost,
                        margin: revenue - cost,
                    }
                }
            };
            MarginResult { pathway, outcome }
        })
        .collect::<Vec<_>>();

    log::debug!(
        "margin: {} computed {}/5 pathways",
        record.identifier,
        results.iter().filter(|r| r.is_computed()).count()
    );

    MarginSet {
        identifier: record.identifier.clone(),
        results,
    }
}

/// (true basis, billing units) or the reason the medical side cannot price.
fn medical_inputs(record: &DrugRecord, config: &MarginConfig) -> Result<(Money, Decimal), String> {
    if !record.has_medical_source() {
        return Err("no billing code crosswalk entry".to_string());
    }
    let payment_limit = positive(record.prices.payment_limit, "payment limit")?;
    let units_per_package =
        positive(record.billing_units_per_package(), "billing units per package")?;

    let units = match &record.dosing {
        None => units_per_package,
        Some(profile) => {
            let resolved = resolve_billing_units(profile).map_err(|e| e.to_string())?;
            let per_fill = match config.dosing_basis {
                DosingBasis::YearOne => resolved.per_fill_year_one(),
                DosingBasis::Maintenance => resolved.per_fill_maintenance(),
            };
            units_per_package * per_fill
        }
    };

    Ok((true_payment_basis(payment_limit), units))
}

fn non_negative(value: Option<Money>, what: &str) -> Result<Money, String> {
    match value {
        None => Err(format!("missing {what}")),
        Some(v) if v < Decimal::ZERO => Err(format!("negative {what}")),
        Some(v) => Ok(v),
    }
}

fn positive(value: Option<Decimal>, what: &str) -> Result<Decimal, String> {
    match value {
        None => Err(format!("missing {what}")),
        Some(v) if v <= Decimal::ZERO => Err(format!("non-positive {what}")),
        Some(v) => Ok(v),
    }
}

pub fn round_money(amount: Money, scale: u32) -> Money {
    amount.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}
