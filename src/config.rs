use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

/// Top-level configuration passed explicitly into every pipeline component.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub sources: SourcesConfig,
    pub warehouse: WarehouseConfig,
    pub pipeline: PipelineConfig,
}

/// Paths to the two tabular inputs produced by the external extractor.
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    /// Race-by-race results of the subject driver.
    pub results: PathBuf,
    /// Per-race winners table.
    pub winners: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    /// Final location of the warehouse database file.
    pub path: PathBuf,
    /// SQL resource with the CREATE TABLE statements, applied verbatim.
    pub schema: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Driver the results source describes; it carries no driver column.
    pub subject_driver: String,
    /// Natural-key strategy for the race dimension.
    #[serde(default)]
    pub race_key: RaceKeyPolicy,
    /// Strict check: exact number of driver-result facts after a load.
    #[serde(default)]
    pub expected_driver_facts: Option<i64>,
}

/// Which column combination uniquely identifies a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceKeyPolicy {
    /// (year, date, circuit) — the canonical key.
    #[default]
    Calendar,
    /// (year, grand_prix) — alternate key, must be selected explicitly.
    EventName,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let cfg: Config = toml::from_str(
            r#"
            [sources]
            results = "data/raw/fernandoalonso.csv"
            winners = "data/raw/winners_f1_1950_2025.csv"

            [warehouse]
            path = "warehouse/f1.db"
            schema = "sql/create_tables.sql"

            [pipeline]
            subject_driver = "Fernando Alonso"
            race_key = "event_name"
            expected_driver_facts = 384
            "#,
        )
        .unwrap();

        assert_eq!(cfg.pipeline.race_key, RaceKeyPolicy::EventName);
        assert_eq!(cfg.pipeline.expected_driver_facts, Some(384));
    }

    #[test]
    fn race_key_defaults_to_calendar() {
        let cfg: Config = toml::from_str(
            r#"
            [sources]
            results = "a.csv"
            winners = "b.csv"

            [warehouse]
            path = "warehouse/f1.db"
            schema = "sql/create_tables.sql"

            [pipeline]
            subject_driver = "Fernando Alonso"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.pipeline.race_key, RaceKeyPolicy::Calendar);
        assert!(cfg.pipeline.expected_driver_facts.is_none());
    }
}
