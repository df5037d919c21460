pub mod dimensions;
pub mod facts;
pub mod normalize;
pub mod quality_gate;

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::extract;
use crate::warehouse::store::WarehouseStore;
use crate::warehouse::verify::{self, IntegrityReport, VerifyOptions};

/// Row counts of a finished load, per warehouse table.
#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub run_id: Uuid,
    pub seasons: i64,
    pub races: i64,
    pub drivers: i64,
    pub teams: i64,
    pub winner_facts: i64,
    pub driver_facts: i64,
    pub warnings: usize,
    pub warehouse: PathBuf,
}

impl LoadSummary {
    pub fn table_counts(&self) -> [(&'static str, i64); 6] {
        [
            ("dim_season", self.seasons),
            ("dim_race", self.races),
            ("dim_driver", self.drivers),
            ("dim_team", self.teams),
            ("fact_race_winners", self.winner_facts),
            ("fact_driver_results", self.driver_facts),
        ]
    }
}

/// Run the full load: extract, normalize, quality-gate, build dimensions and
/// facts, persist, verify. The warehouse is built in a scratch file and only
/// renamed over the configured path once verification passes, so a reader
/// never observes a half-populated warehouse.
#[instrument(skip(config))]
pub fn run_load(config: &Config) -> Result<LoadSummary> {
    let run_id = Uuid::new_v4();
    info!(%run_id, "starting warehouse load");

    let (raw_results, raw_winners) = extract::extract_sources(&config.sources)?;

    let results = normalize::normalize_results(&raw_results)?;
    let winners = normalize::normalize_winners(&raw_winners)?;

    quality_gate::validate(&results, &quality_gate::results_rules())?;
    quality_gate::validate(&winners, &quality_gate::winners_rules())?;

    let dims = dimensions::build_dimensions(&results, &winners, &config.pipeline)?;
    let facts = facts::build_facts(&results, &winners, &dims, &config.pipeline)?;

    let scratch = scratch_path(&config.warehouse.path);
    if scratch.exists() {
        fs::remove_file(&scratch)?;
    }

    let summary = match load_and_verify(config, run_id, &scratch, &dims, &facts) {
        Ok(summary) => summary,
        Err(e) => {
            // Never leave a broken scratch warehouse behind.
            let _ = fs::remove_file(&scratch);
            return Err(e);
        }
    };

    fs::rename(&scratch, &config.warehouse.path)?;
    info!(
        %run_id,
        warehouse = %config.warehouse.path.display(),
        warnings = summary.warnings,
        "load complete, warehouse published"
    );
    Ok(summary)
}

fn load_and_verify(
    config: &Config,
    run_id: Uuid,
    scratch: &Path,
    dims: &dimensions::Dimensions,
    facts: &facts::Facts,
) -> Result<LoadSummary> {
    let mut store = WarehouseStore::open(scratch)?;
    store.create_schema(&config.warehouse.schema)?;

    for table in [
        &dims.season,
        &dims.race,
        &dims.driver,
        &dims.team,
        &facts.winners,
        &facts.driver_results,
    ] {
        store.append(table)?;
    }

    let report = verify::verify(&store, &verify_options(config))?;

    Ok(LoadSummary {
        run_id,
        seasons: store.count("dim_season")?,
        races: store.count("dim_race")?,
        drivers: store.count("dim_driver")?,
        teams: store.count("dim_team")?,
        winner_facts: store.count("fact_race_winners")?,
        driver_facts: store.count("fact_driver_results")?,
        warnings: report.warnings.len(),
        warehouse: config.warehouse.path.clone(),
    })
}

/// Re-run the integrity checks against an already published warehouse.
pub fn run_verify(config: &Config) -> Result<IntegrityReport> {
    let path = &config.warehouse.path;
    if !path.exists() {
        return Err(PipelineError::SourceNotFound(path.clone()));
    }
    let store = WarehouseStore::open(path)?;
    verify::verify(&store, &verify_options(config))
}

/// Per-table row counts of an already published warehouse.
pub fn gather_stats(config: &Config) -> Result<Vec<(String, i64)>> {
    let path = &config.warehouse.path;
    if !path.exists() {
        return Err(PipelineError::SourceNotFound(path.clone()));
    }
    let store = WarehouseStore::open(path)?;

    let mut counts = Vec::new();
    for table in verify::DIMENSION_TABLES
        .iter()
        .chain(verify::FACT_TABLES.iter())
    {
        counts.push(((*table).to_string(), store.count(table)?));
    }
    Ok(counts)
}

fn verify_options(config: &Config) -> VerifyOptions {
    VerifyOptions {
        race_key: config.pipeline.race_key,
        expected_driver_facts: config.pipeline.expected_driver_facts,
    }
}

fn scratch_path(warehouse: &Path) -> PathBuf {
    let mut name = warehouse
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "warehouse.db".into());
    name.push(".loading");
    warehouse.with_file_name(name)
}
