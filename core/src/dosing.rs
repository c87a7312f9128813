//! Dosing resolver — year-one vs maintenance billing units.
//!
//! A loading-dose drug bills more units in the first year of therapy than in
//! any later year. The resolver turns a per-fill dose schedule into the two
//! unit totals and the per-fill weighted multiplier the margin engine uses.

use crate::{
    error::{CoreError, CoreResult},
    types::DAYS_PER_YEAR,
};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Expected patient compliance applied to year-one projections.
pub const DEFAULT_COMPLIANCE_RATE: Decimal = dec!(0.90);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DosingProfile {
    /// Per-fill unit multipliers for the loading period, in fill order.
    #[serde(default)]
    pub induction_fills:             Vec<Decimal>,
    /// Length of the loading period; 0 when there is no induction.
    #[serde(default)]
    pub induction_days:              u32,
    pub maintenance_fills_per_year:  u32,
    pub maintenance_unit_multiplier: Decimal,
}

impl DosingProfile {
    /// A schedule with no loading period.
    pub fn maintenance_only(fills_per_year: u32, unit_multiplier: Decimal) -> Self {
        Self {
            induction_fills:             Vec::new(),
            induction_days:              0,
            maintenance_fills_per_year:  fills_per_year,
            maintenance_unit_multiplier: unit_multiplier,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.maintenance_unit_multiplier <= Decimal::ZERO {
            return Err(CoreError::dosing("maintenance_unit_multiplier must be positive"));
        }
        if self.maintenance_fills_per_year == 0 {
            return Err(CoreError::dosing("maintenance_fills_per_year must be at least 1"));
        }
        if let Some(pos) = self.induction_fills.iter().position(|m| *m <= Decimal::ZERO) {
            return Err(CoreError::dosing(format!("induction fill {pos} has a non-positive multiplier")));
        }
        if self.induction_days > DAYS_PER_YEAR {
            return Err(CoreError::dosing(format!(
                "induction_days {} exceeds {DAYS_PER_YEAR}",
                self.induction_days
            )));
        }
        if self.induction_fills.is_empty() && self.induction_days > 0 {
            return Err(CoreError::dosing("induction_days set without induction fills"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedUnits {
    pub year_one_units:                Decimal,
    pub maintenance_units:             Decimal,
    pub induction_fill_count:          u32,
    pub maintenance_fills_in_year_one: u32,
    pub maintenance_fills_per_year:    u32,
}

/// Resolve a dose schedule into year-one and steady-state unit totals.
pub fn resolve_billing_units(profile: &DosingProfile) -> CoreResult<ResolvedUnits> {
    profile.validate()?;

    let remaining_days = u64::from(DAYS_PER_YEAR - profile.induction_days);
    let maintenance_fills_in_year_one =
        (remaining_days * u64::from(profile.maintenance_fills_per_year) / u64::from(DAYS_PER_YEAR)) as u32;

    let induction_units: Decimal = profile.induction_fills.iter().copied().sum();
    let year_one_units = induction_units
        + profile.maintenance_unit_multiplier * Decimal::from(maintenance_fills_in_year_one);
    let maintenance_units =
        profile.maintenance_unit_multiplier * Decimal::from(profile.maintenance_fills_per_year);

    log::debug!(
        "dosing: {} induction fills + {maintenance_fills_in_year_one} maintenance -> year one {year_one_units}, maintenance {maintenance_units}",
        profile.induction_fills.len()
    );

    Ok(ResolvedUnits {
        year_one_units,
        maintenance_units,
        induction_fill_count: profile.induction_fills.len() as u32,
        maintenance_fills_in_year_one,
        maintenance_fills_per_year: profile.maintenance_fills_per_year,
    })
}

impl ResolvedUnits {
    pub fn year_one_fill_count(&self) -> u32 {
        self.induction_fill_count + self.maintenance_fills_in_year_one
    }

    /// Weighted units per fill across the first year.
    pub fn per_fill_year_one(&self) -> Decimal {
        match self.year_one_fill_count() {
            0 => Decimal::ZERO,
            fills => self.year_one_units / Decimal::from(fills),
        }
    }

    pub fn per_fill_maintenance(&self) -> Decimal {
        match self.maintenance_fills_per_year {
            0 => Decimal::ZERO,
            fills => self.maintenance_units / Decimal::from(fills),
        }
    }

    /// Year-one units scaled by expected compliance, rounded to 2 places.
    pub fn compliance_adjusted_year_one(&self, compliance_rate: Decimal) -> Decimal {
        (self.year_one_units * compliance_rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Extra units billed in year one over a steady-state year.
    pub fn loading_dose_delta(&self) -> Decimal {
        self.year_one_units - self.maintenance_units
    }

    pub fn loading_dose_delta_pct(&self) -> Decimal {
        if self.maintenance_units > Decimal::ZERO {
            self.loading_dose_delta() / self.maintenance_units * dec!(100)
        } else {
            Decimal::ZERO
        }
    }

    /// Units over `years` of therapy: one loading year, the rest maintenance.
    pub fn lifetime_units(&self, years: u32) -> Decimal {
        match years {
            0 => Decimal::ZERO,
            n => self.year_one_units + self.maintenance_units * Decimal::from(n - 1),
        }
    }

    pub fn average_annual_units(&self, years: u32) -> Decimal {
        match years {
            0 => Decimal::ZERO,
            n => self.lifetime_units(n) / Decimal::from(n),
        }
    }
}
