//! siteopt-runner: headless site-of-care margin run over clean CSV inputs.
//!
//! Usage:
//!   siteopt-runner --data-dir ./data --config-dir ./config --out report.json
//!   siteopt-runner --data-dir ./data --capture-rate 0.4 --top 10
//!
//! Expected files under --data-dir (headers already normalized upstream):
//!   catalog.csv          ndc, product_name, manufacturer, is_brand, contract_cost, awp
//!   crosswalk.csv        ndc, hcpcs, description, ..., billing_units_per_package
//!   payment_limits.csv   hcpcs, payment_limit
//!   nadac.csv            ndc, nadac, discount_pct, penny_pricing, inflation_penalty_pct
//!   ira_drugs.csv        drug_name, year, description
//! Optional:
//!   retail_prices.csv, cp_restrictions.csv, dosing.json
//!   noc_crosswalk.csv    ndc, generic_name, billing_units_per_package
//!   noc_pricing.csv      generic_name, payment_limit

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use siteopt_core::{
    config::EngineConfig,
    crosswalk::CrosswalkAttributes,
    margin::Pathway,
    pipeline::{
        NamedDosingProfile, Pipeline, PipelineInputs, PipelineOutput, RawAcquisitionRow,
        RawCatalogRow, RawCrosswalkRow, RawNocCrosswalkRow, RawNocPaymentRow, RawPaymentLimitRow,
        RawRetailPriceRow,
    },
    ranking::{capture_sensitivity, top_opportunities},
    risk::{IraDrugEntry, IraDrugList, RestrictionEntry, RestrictionTable, RiskLists},
};
use std::{env, path::Path, str::FromStr};

// ── CSV row shapes ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CatalogCsv {
    ndc:           String,
    product_name:  String,
    manufacturer:  Option<String>,
    #[serde(default)]
    is_brand:      String,
    contract_cost: Option<Decimal>,
    awp:           Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct CrosswalkCsv {
    ndc:                       String,
    hcpcs:                     String,
    description:               Option<String>,
    product_name:              Option<String>,
    manufacturer:              Option<String>,
    dosage:                    Option<String>,
    package_size:              Option<Decimal>,
    package_quantity:          Option<Decimal>,
    billing_units_per_item:    Option<Decimal>,
    billing_units_per_package: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct PaymentLimitCsv {
    hcpcs:         String,
    payment_limit: Decimal,
}

#[derive(Debug, Deserialize)]
struct NadacCsv {
    ndc:                   String,
    nadac:                 Option<Decimal>,
    discount_pct:          Option<Decimal>,
    #[serde(default)]
    penny_pricing:         String,
    inflation_penalty_pct: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct RetailPriceCsv {
    ndc:           String,
    actual_retail: Decimal,
}

#[derive(Debug, Deserialize)]
struct NocCrosswalkCsv {
    ndc:                       String,
    generic_name:              String,
    billing_units_per_package: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct NocPricingCsv {
    generic_name:  String,
    payment_limit: Decimal,
}

#[derive(Serialize)]
struct RunReport<'a> {
    run_id:       String,
    generated_at: String,
    version:      &'static str,
    config:       &'a EngineConfig,
    output:       &'a PipelineOutput,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let data_dir = str_arg(&args, "--data-dir").unwrap_or("./data");
    let config_dir = str_arg(&args, "--config-dir").unwrap_or("./config");
    let out_path = str_arg(&args, "--out").unwrap_or("siteopt-report.json");
    let top_override: Option<usize> = parsed_arg(&args, "--top")?;
    let capture_override: Option<Decimal> = parsed_arg(&args, "--capture-rate")?;

    let mut config = EngineConfig::load(config_dir)
        .with_context(|| format!("loading engine config from {config_dir}"))?;
    if let Some(rate) = capture_override {
        config.ranking.capture_rate = rate;
        config.validate().context("--capture-rate")?;
    }
    let top_n = top_override.unwrap_or(config.ranking.top_n);

    let run_id = uuid::Uuid::new_v4().to_string();
    println!("Site-of-care margin runner");
    println!("  run_id:       {run_id}");
    println!("  data_dir:     {data_dir}");
    println!("  config_dir:   {config_dir}");
    println!("  capture rate: {}", config.ranking.capture_rate);
    println!();

    let inputs = load_inputs(Path::new(data_dir))?;
    let output = Pipeline::run(&inputs, &config)?;

    print_summary(&output, &config, top_n)?;

    let report = RunReport {
        run_id,
        generated_at: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
        config: &config,
        output: &output,
    };
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(out_path, json).with_context(|| format!("writing {out_path}"))?;
    println!();
    println!("report written to {out_path}");

    Ok(())
}

fn load_inputs(dir: &Path) -> Result<PipelineInputs> {
    let catalog = read_csv::<CatalogCsv>(&dir.join("catalog.csv"))?
        .into_iter()
        .map(|r| RawCatalogRow {
            identifier:    r.ndc,
            product_name:  r.product_name,
            manufacturer:  r.manufacturer,
            is_brand:      truthy(&r.is_brand),
            contract_cost: r.contract_cost,
            list_price:    r.awp,
        })
        .collect();

    let crosswalk = read_csv::<CrosswalkCsv>(&dir.join("crosswalk.csv"))?
        .into_iter()
        .map(|r| RawCrosswalkRow {
            identifier:   r.ndc,
            billing_code: r.hcpcs,
            attributes: CrosswalkAttributes {
                description:               r.description,
                product_name:              r.product_name,
                manufacturer:              r.manufacturer,
                dosage:                    r.dosage,
                package_size:              r.package_size,
                package_quantity:          r.package_quantity,
                billing_units_per_item:    r.billing_units_per_item,
                billing_units_per_package: r.billing_units_per_package,
            },
        })
        .collect();

    let payment_limits = read_csv::<PaymentLimitCsv>(&dir.join("payment_limits.csv"))?
        .into_iter()
        .map(|r| RawPaymentLimitRow {
            billing_code:  r.hcpcs,
            payment_limit: r.payment_limit,
        })
        .collect();

    let acquisition = read_csv::<NadacCsv>(&dir.join("nadac.csv"))?
        .into_iter()
        .map(|r| RawAcquisitionRow {
            identifier:            r.ndc,
            acquisition_cost:      r.nadac,
            discount_pct:          r.discount_pct,
            penny_indicator:       truthy(&r.penny_pricing),
            inflation_penalty_pct: r.inflation_penalty_pct,
        })
        .collect();

    let ira = IraDrugList::new(read_csv::<IraDrugEntry>(&dir.join("ira_drugs.csv"))?);

    let retail_prices = read_optional_csv::<RetailPriceCsv>(&dir.join("retail_prices.csv"))?
        .into_iter()
        .map(|r| RawRetailPriceRow {
            identifier:    r.ndc,
            actual_retail: r.actual_retail,
        })
        .collect();

    let restrictions =
        RestrictionTable::new(read_optional_csv::<RestrictionEntry>(&dir.join("cp_restrictions.csv"))?);

    let noc_crosswalk = read_optional_csv::<NocCrosswalkCsv>(&dir.join("noc_crosswalk.csv"))?
        .into_iter()
        .map(|r| RawNocCrosswalkRow {
            identifier:                r.ndc,
            generic_name:              r.generic_name,
            billing_units_per_package: r.billing_units_per_package,
        })
        .collect::<Vec<_>>();

    let noc_pricing = read_optional_csv::<NocPricingCsv>(&dir.join("noc_pricing.csv"))?
        .into_iter()
        .map(|r| RawNocPaymentRow {
            generic_name:  r.generic_name,
            payment_limit: r.payment_limit,
        })
        .collect::<Vec<_>>();

    let dosing_path = dir.join("dosing.json");
    let dosing: Vec<NamedDosingProfile> = if dosing_path.exists() {
        let content = std::fs::read_to_string(&dosing_path)
            .with_context(|| format!("reading {}", dosing_path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", dosing_path.display()))?
    } else {
        Vec::new()
    };

    log::info!(
        "runner: {} IRA entries, {} restriction entries, {} dosing profiles, {} NOC mappings",
        ira.len(),
        restrictions.len(),
        dosing.len(),
        noc_crosswalk.len()
    );

    Ok(PipelineInputs {
        catalog,
        crosswalk,
        payment_limits,
        acquisition,
        retail_prices,
        dosing,
        noc_crosswalk,
        noc_pricing,
        risk_lists: RiskLists { ira, restrictions },
    })
}

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut rows = Vec::new();
    for (line, row) in reader.deserialize().enumerate() {
        match row {
            Ok(row) => rows.push(row),
            // Header is line 1; data starts at 2.
            Err(e) => log::warn!("runner: {} row {} skipped: {e}", path.display(), line + 2),
        }
    }
    log::info!("runner: read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

fn read_optional_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if path.exists() {
        read_csv(path)
    } else {
        log::info!("runner: {} not present, skipping", path.display());
        Ok(Vec::new())
    }
}

fn print_summary(output: &PipelineOutput, config: &EngineConfig, top_n: usize) -> Result<()> {
    let stats = &output.stats;
    let integrity = &output.integrity;

    println!("=== RUN SUMMARY ===");
    println!("  catalog rows:      {}", stats.catalog_rows);
    println!("  drug records:      {}", stats.drug_records);
    println!("  crosswalk rows:    {}", output.crosswalk.len());
    println!(
        "  crosswalk match:   {}/{} ({:.1}%){}",
        integrity.matched,
        integrity.total,
        integrity.match_rate * 100.0,
        if integrity.passed { "" } else { "  BELOW MINIMUM" }
    );
    println!(
        "  rejected rows:     catalog {} | crosswalk {} | payment limits {} | nadac {} | retail {}",
        stats.rejected_catalog_identifiers,
        stats.rejected_crosswalk_rows,
        stats.rejected_payment_limit_codes,
        stats.rejected_acquisition_rows,
        stats.rejected_retail_price_rows
    );
    println!("  rejected NOC rows: {}", stats.rejected_noc_rows);
    println!("  invalid amounts:   {}", stats.invalid_amounts);
    println!("  invalid dosing:    {}", stats.invalid_dosing_profiles);
    println!(
        "  priced via NOC:    {}",
        output.ranking.all.iter().filter(|r| r.is_noc).count()
    );
    println!(
        "  ranked:            {} of {}",
        output.ranking.ranked.len(),
        output.ranking.all.len()
    );
    println!();

    println!("=== TOP OPPORTUNITIES ===");
    let top = top_opportunities(&output.ranking, top_n);
    if top.is_empty() {
        println!("  (no rankable drugs)");
    }
    for (rank, record) in top.iter().enumerate() {
        let best = record
            .margins
            .recommendation()
            .map(|r| format!("{} (+${})", r.pathway, r.margin_delta))
            .unwrap_or_else(|| "-".to_string());
        let blended = record
            .blended_margin()
            .map(|m| format!("{:.2}", m))
            .unwrap_or_default();
        println!(
            "  {:>3}. {} {:<28} blended ${:>12} | best: {}{}",
            rank + 1,
            record.identifier.formatted(),
            record.product_name,
            blended,
            best,
            if record.is_noc { " [NOC]" } else { "" }
        );
        for warning in &record.warnings {
            println!("       ! {warning}");
        }
    }

    if let Some(leader) = top.first() {
        println!();
        println!("=== CAPTURE SENSITIVITY: {} ===", leader.product_name);
        let points = capture_sensitivity(
            &leader.margins,
            &config.ranking.payer_mix,
            &config.ranking.sensitivity_rates,
        )?;
        for p in points {
            println!(
                "  capture {:>5} | retail ${:>12.2} | medical ${:>12.2}",
                p.capture_rate, p.retail_contribution, p.medical_contribution
            );
        }
        if let Some(dosing) = &leader.dosing {
            let years = config.quality.lifetime_years;
            println!(
                "  dosing: year one {} units ({} at {} compliance), maintenance {}",
                dosing.year_one_units,
                dosing.compliance_adjusted_year_one(config.quality.compliance_rate),
                config.quality.compliance_rate,
                dosing.maintenance_units
            );
            println!(
                "  {years}-year units {} (avg {:.2}/yr), loading delta {:.1}%",
                dosing.lifetime_units(years),
                dosing.average_annual_units(years),
                dosing.loading_dose_delta_pct()
            );
        }
    }

    let low_confidence: Vec<_> = output
        .retail_checks
        .iter()
        .filter(|c| !c.validation.is_valid())
        .collect();
    if !low_confidence.is_empty() {
        println!();
        println!("=== RETAIL PRICE CHECKS ({} low confidence) ===", low_confidence.len());
        for check in low_confidence {
            println!(
                "  {} {}: calculated {:?} vs market {:?}",
                check.identifier.formatted(),
                Pathway::PharmacyMedicareCommercial,
                check.validation.calculated,
                check.validation.actual
            );
        }
    }

    Ok(())
}

fn truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "yes" | "y" | "true" | "1" | "brand")
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

/// A flag value that must parse when present; a bad value is fatal.
fn parsed_arg<T>(args: &[String], flag: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    str_arg(args, flag)
        .map(str::parse)
        .transpose()
        .with_context(|| format!("invalid value for {flag}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn absent_flag_is_none() {
        let a = args(&["siteopt-runner", "--data-dir", "./data"]);
        assert_eq!(parsed_arg::<usize>(&a, "--top").unwrap(), None);
    }

    #[test]
    fn valid_flag_values_parse() {
        let a = args(&["siteopt-runner", "--top", "10", "--capture-rate", "0.4"]);
        assert_eq!(parsed_arg::<usize>(&a, "--top").unwrap(), Some(10));
        assert_eq!(
            parsed_arg::<Decimal>(&a, "--capture-rate").unwrap(),
            Some(Decimal::new(4, 1))
        );
    }

    #[test]
    fn unparsable_flag_value_is_an_error() {
        let a = args(&["siteopt-runner", "--top", "ten", "--capture-rate", "forty"]);
        let err = parsed_arg::<usize>(&a, "--top").unwrap_err();
        assert!(err.to_string().contains("--top"));
        assert!(parsed_arg::<Decimal>(&a, "--capture-rate").is_err());
    }

    #[test]
    fn truthy_accepts_source_indicators() {
        assert!(truthy(" Yes "));
        assert!(truthy("BRAND"));
        assert!(!truthy("generic"));
        assert!(!truthy(""));
    }
}
