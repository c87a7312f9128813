use crate::{
    error::{CoreError, CoreResult},
    types::Rate,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

// ── Margin engine ───────────────────────────────────────────────────

/// Which dosing total feeds the per-fill billing-unit multiplier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DosingBasis {
    #[default]
    YearOne,
    Maintenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginConfig {
    pub commercial_multiplier: Rate,
    pub medicaid_multiplier:   Rate,
    pub medicare_multiplier:   Rate,
    pub retail_brand_pct:      Rate,
    pub retail_generic_pct:    Rate,
    /// Flat fee added to the acquisition reference for pharmacy Medicaid.
    pub dispense_fee:          Decimal,
    pub medicaid_markup_pct:   Rate,
    pub dosing_basis:          DosingBasis,
    /// Decimal places money is rounded to.
    pub currency_scale:        u32,
}

impl Default for MarginConfig {
    fn default() -> Self {
        Self {
            commercial_multiplier: dec!(1.15),
            medicaid_multiplier:   dec!(1.04),
            medicare_multiplier:   dec!(1.06),
            retail_brand_pct:      dec!(0.85),
            retail_generic_pct:    dec!(0.20),
            dispense_fee:          Decimal::ZERO,
            medicaid_markup_pct:   Decimal::ZERO,
            dosing_basis:          DosingBasis::YearOne,
            currency_scale:        2,
        }
    }
}

impl MarginConfig {
    pub fn validate(&self) -> CoreResult<()> {
        positive("margin.commercial_multiplier", self.commercial_multiplier)?;
        positive("margin.medicaid_multiplier", self.medicaid_multiplier)?;
        positive("margin.medicare_multiplier", self.medicare_multiplier)?;
        fraction("margin.retail_brand_pct", self.retail_brand_pct)?;
        fraction("margin.retail_generic_pct", self.retail_generic_pct)?;
        non_negative("margin.dispense_fee", self.dispense_fee)?;
        non_negative("margin.medicaid_markup_pct", self.medicaid_markup_pct)?;
        if self.currency_scale > 6 {
            return Err(CoreError::config("margin.currency_scale", "must be between 0 and 6"));
        }
        Ok(())
    }
}

// ── Risk flagger ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Discount off list price (percent) at or above which a drug is penny-priced.
    pub penny_discount_threshold_pct:    Decimal,
    /// Inflation penalty (percent) strictly above which a warning is raised.
    pub inflation_penalty_threshold_pct: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            penny_discount_threshold_pct:    dec!(95.0),
            inflation_penalty_threshold_pct: dec!(20.0),
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.penny_discount_threshold_pct <= Decimal::ZERO
            || self.penny_discount_threshold_pct > dec!(100)
        {
            return Err(CoreError::config(
                "risk.penny_discount_threshold_pct",
                "must be in (0, 100]",
            ));
        }
        non_negative("risk.inflation_penalty_threshold_pct", self.inflation_penalty_threshold_pct)
    }
}

// ── Opportunity ranker ──────────────────────────────────────────────

/// Share of a drug's volume billed through each pathway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayerMix {
    pub pharmacy_medicaid:            Rate,
    pub pharmacy_medicare_commercial: Rate,
    pub medical_medicaid:             Rate,
    pub medical_medicare:             Rate,
    pub medical_commercial:           Rate,
}

impl Default for PayerMix {
    fn default() -> Self {
        Self {
            pharmacy_medicaid:            dec!(0.10),
            pharmacy_medicare_commercial: dec!(0.30),
            medical_medicaid:             dec!(0.10),
            medical_medicare:             dec!(0.25),
            medical_commercial:           dec!(0.25),
        }
    }
}

/// Allowed drift of the payer-mix total from 1.
pub const PAYER_MIX_TOLERANCE: Decimal = dec!(0.0001);

impl PayerMix {
    pub fn weights(&self) -> [Rate; 5] {
        [
            self.pharmacy_medicaid,
            self.pharmacy_medicare_commercial,
            self.medical_medicaid,
            self.medical_medicare,
            self.medical_commercial,
        ]
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.weights().iter().any(|w| *w < Decimal::ZERO) {
            return Err(CoreError::config("ranking.payer_mix", "weights must be non-negative"));
        }
        let total: Decimal = self.weights().iter().sum();
        if (total - Decimal::ONE).abs() > PAYER_MIX_TOLERANCE {
            return Err(CoreError::config(
                "ranking.payer_mix",
                format!("weights must sum to 1, got {total}"),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub payer_mix:         PayerMix,
    pub capture_rate:      Rate,
    pub sensitivity_rates: Vec<Rate>,
    pub top_n:             usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            payer_mix:         PayerMix::default(),
            capture_rate:      Decimal::ONE,
            sensitivity_rates: vec![dec!(0.40), dec!(0.45), dec!(0.60), dec!(0.80), dec!(1.00)],
            top_n:             25,
        }
    }
}

impl RankingConfig {
    pub fn validate(&self) -> CoreResult<()> {
        self.payer_mix.validate()?;
        validate_capture_rate(self.capture_rate)?;
        for rate in &self.sensitivity_rates {
            fraction("ranking.sensitivity_rates", *rate)?;
        }
        Ok(())
    }
}

pub fn validate_capture_rate(capture_rate: Rate) -> CoreResult<()> {
    fraction("ranking.capture_rate", capture_rate)
}

// ── Data quality checks ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_crosswalk_match_rate:  f64,
    pub retail_variance_threshold: Rate,
    pub compliance_rate:           Rate,
    pub lifetime_years:            u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_crosswalk_match_rate:  0.95,
            retail_variance_threshold: dec!(0.20),
            compliance_rate:           dec!(0.90),
            lifetime_years:            5,
        }
    }
}

impl QualityConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if !(0.0..=1.0).contains(&self.min_crosswalk_match_rate) {
            return Err(CoreError::config("quality.min_crosswalk_match_rate", "must be in [0, 1]"));
        }
        non_negative("quality.retail_variance_threshold", self.retail_variance_threshold)?;
        fraction("quality.compliance_rate", self.compliance_rate)?;
        if self.lifetime_years == 0 {
            return Err(CoreError::config("quality.lifetime_years", "must be at least 1"));
        }
        Ok(())
    }
}

// ── Engine config ───────────────────────────────────────────────────

/// Every tunable the core reads. Passed explicitly into each stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub margin:  MarginConfig,
    pub risk:    RiskConfig,
    pub ranking: RankingConfig,
    pub quality: QualityConfig,
}

impl EngineConfig {
    /// Load from `<config_dir>/engine.json` and validate.
    /// In tests, use EngineConfig::default_test().
    pub fn load(config_dir: &str) -> CoreResult<Self> {
        let path = format!("{config_dir}/engine.json");
        let content = std::fs::read_to_string(&path).map_err(|source| CoreError::Io {
            path: path.clone(),
            source,
        })?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        log::info!("config: loaded {path}");
        Ok(config)
    }

    pub fn from_json(content: &str) -> CoreResult<Self> {
        let config: EngineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Deterministic defaults for tests: published multipliers, full capture.
    pub fn default_test() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.margin.validate()?;
        self.risk.validate()?;
        self.ranking.validate()?;
        self.quality.validate()
    }
}

// ── Range helpers ───────────────────────────────────────────────────

fn positive(field: &str, value: Decimal) -> CoreResult<()> {
    if value <= Decimal::ZERO {
        return Err(CoreError::config(field, format!("must be positive, got {value}")));
    }
    Ok(())
}

fn non_negative(field: &str, value: Decimal) -> CoreResult<()> {
    if value < Decimal::ZERO {
        return Err(CoreError::config(field, format!("must not be negative, got {value}")));
    }
    Ok(())
}

fn fraction(field: &str, value: Decimal) -> CoreResult<()> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(CoreError::config(field, format!("must be in [0, 1], got {value}")));
    }
    Ok(())
}
