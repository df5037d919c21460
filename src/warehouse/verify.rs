use std::fmt;
use tracing::{info, warn};

use crate::config::RaceKeyPolicy;
use crate::error::{PipelineError, Result};
use crate::warehouse::store::WarehouseStore;

pub const DIMENSION_TABLES: [&str; 4] = ["dim_season", "dim_race", "dim_driver", "dim_team"];
pub const FACT_TABLES: [&str; 2] = ["fact_race_winners", "fact_driver_results"];

/// One failed (or advisory) integrity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityViolation {
    pub check: String,
    pub table: String,
    pub count: i64,
    pub detail: String,
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} (count={})",
            self.check, self.table, self.detail, self.count
        )
    }
}

/// Everything the verifier found: fatal violations plus advisory warnings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub violations: Vec<IntegrityViolation>,
    pub warnings: Vec<IntegrityViolation>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions {
    pub race_key: RaceKeyPolicy,
    pub expected_driver_facts: Option<i64>,
}

/// Run every post-load check, aggregating all failures instead of stopping
/// at the first, and fail with the complete list.
pub fn verify(store: &WarehouseStore, options: &VerifyOptions) -> Result<IntegrityReport> {
    let mut report = IntegrityReport::default();

    check_non_empty(store, &mut report)?;
    check_foreign_keys(store, &mut report)?;
    check_duplicate_natural_keys(store, options.race_key, &mut report)?;
    check_duplicate_driver_race_pairs(store, &mut report)?;
    check_unreferenced_dimensions(store, &mut report)?;
    if let Some(expected) = options.expected_driver_facts {
        check_expected_driver_facts(store, expected, &mut report)?;
    }

    for warning in &report.warnings {
        warn!(%warning, "integrity warning");
    }
    if report.violations.is_empty() {
        info!(warnings = report.warnings.len(), "integrity verification passed");
        Ok(report)
    } else {
        Err(PipelineError::Integrity(report))
    }
}

fn check_non_empty(store: &WarehouseStore, report: &mut IntegrityReport) -> Result<()> {
    for table in DIMENSION_TABLES.iter().chain(FACT_TABLES.iter()) {
        let count = store.count(table)?;
        if count == 0 {
            report.violations.push(IntegrityViolation {
                check: "non_empty".into(),
                table: (*table).into(),
                count: 0,
                detail: "table is empty after load".into(),
            });
        }
    }
    Ok(())
}

fn check_foreign_keys(store: &WarehouseStore, report: &mut IntegrityReport) -> Result<()> {
    let references = [
        ("race_id", "dim_race"),
        ("season_id", "dim_season"),
        ("driver_id", "dim_driver"),
        ("team_id", "dim_team"),
    ];
    for fact in FACT_TABLES {
        for (key, dimension) in references {
            let orphans = store.scalar(&format!(
                "SELECT COUNT(*) FROM {fact} f \
                 LEFT JOIN {dimension} d ON f.{key} = d.{key} \
                 WHERE d.{key} IS NULL"
            ))?;
            if orphans > 0 {
                report.violations.push(IntegrityViolation {
                    check: "foreign_key".into(),
                    table: fact.into(),
                    count: orphans,
                    detail: format!("{key} does not resolve to a row in {dimension}"),
                });
            }
        }
    }
    Ok(())
}

fn check_duplicate_natural_keys(
    store: &WarehouseStore,
    race_key: RaceKeyPolicy,
    report: &mut IntegrityReport,
) -> Result<()> {
    let race_columns = match race_key {
        RaceKeyPolicy::Calendar => "year, date, circuit",
        RaceKeyPolicy::EventName => "year, grand_prix",
    };
    let natural_keys = [
        ("dim_season", "year".to_string()),
        ("dim_race", race_columns.to_string()),
        ("dim_driver", "driver_name".to_string()),
        ("dim_team", "team_name".to_string()),
    ];
    for (table, columns) in natural_keys {
        let duplicates = store.scalar(&format!(
            "SELECT COUNT(*) FROM ( \
               SELECT {columns} FROM {table} GROUP BY {columns} HAVING COUNT(*) > 1 \
             )"
        ))?;
        if duplicates > 0 {
            report.violations.push(IntegrityViolation {
                check: "unique_natural_key".into(),
                table: table.into(),
                count: duplicates,
                detail: format!("duplicate ({columns}) natural keys"),
            });
        }
    }
    Ok(())
}

fn check_duplicate_driver_race_pairs(
    store: &WarehouseStore,
    report: &mut IntegrityReport,
) -> Result<()> {
    let duplicates = store.scalar(
        "SELECT COUNT(*) FROM ( \
           SELECT driver_id, race_id FROM fact_driver_results \
           GROUP BY driver_id, race_id HAVING COUNT(*) > 1 \
         )",
    )?;
    if duplicates > 0 {
        report.violations.push(IntegrityViolation {
            check: "unique_driver_race".into(),
            table: "fact_driver_results".into(),
            count: duplicates,
            detail: "more than one fact for the same (driver, race) pairing".into(),
        });
    }
    Ok(())
}

/// Advisory only: a dimension row no fact references is suspicious but not
/// a broken warehouse.
fn check_unreferenced_dimensions(
    store: &WarehouseStore,
    report: &mut IntegrityReport,
) -> Result<()> {
    let races_without_winner = store.scalar(
        "SELECT COUNT(*) FROM dim_race r \
         LEFT JOIN fact_race_winners f ON f.race_id = r.race_id \
         WHERE f.race_id IS NULL",
    )?;
    if races_without_winner > 0 {
        report.warnings.push(IntegrityViolation {
            check: "unreferenced_dimension".into(),
            table: "dim_race".into(),
            count: races_without_winner,
            detail: "races with no winner fact".into(),
        });
    }

    for (dimension, key) in [
        ("dim_season", "season_id"),
        ("dim_driver", "driver_id"),
        ("dim_team", "team_id"),
    ] {
        let unreferenced = store.scalar(&format!(
            "SELECT COUNT(*) FROM {dimension} d \
             WHERE NOT EXISTS (SELECT 1 FROM fact_race_winners w WHERE w.{key} = d.{key}) \
               AND NOT EXISTS (SELECT 1 FROM fact_driver_results r WHERE r.{key} = d.{key})"
        ))?;
        if unreferenced > 0 {
            report.warnings.push(IntegrityViolation {
                check: "unreferenced_dimension".into(),
                table: dimension.into(),
                count: unreferenced,
                detail: "rows referenced by no fact".into(),
            });
        }
    }
    Ok(())
}

fn check_expected_driver_facts(
    store: &WarehouseStore,
    expected: i64,
    report: &mut IntegrityReport,
) -> Result<()> {
    let actual = store.count("fact_driver_results")?;
    if actual != expected {
        report.violations.push(IntegrityViolation {
            check: "expected_count".into(),
            table: "fact_driver_results".into(),
            count: actual,
            detail: format!("expected exactly {expected} driver facts, found {actual}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = include_str!("../../sql/create_tables.sql");

    const SEED: &str = "\
        INSERT INTO dim_season VALUES (1, 2005);\n\
        INSERT INTO dim_race VALUES (1, 2005, 1, 'australian grand prix', '2005-03-06', 'Albert Park', NULL);\n\
        INSERT INTO dim_driver VALUES (1, 'Fernando Alonso'), (2, 'Giancarlo Fisichella');\n\
        INSERT INTO dim_team VALUES (1, 'Renault');\n\
        INSERT INTO fact_race_winners VALUES (1, 1, 1, 2, 1, 57, '1:24:17.336');\n\
        INSERT INTO fact_driver_results VALUES (1, 1, 1, 1, 1, 1, 13, 3, 1, NULL);\n";

    fn populated_store() -> WarehouseStore {
        let store = WarehouseStore::open_in_memory().unwrap();
        store.apply_schema(SCHEMA).unwrap();
        store.apply_schema(SEED).unwrap();
        store
    }

    #[test]
    fn clean_warehouse_passes_without_warnings() {
        let store = populated_store();
        let report = verify(&store, &VerifyOptions::default()).unwrap();
        assert!(report.violations.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn corrupted_team_fk_reports_exactly_one_violation() {
        let store = populated_store();
        store
            .apply_schema("UPDATE fact_driver_results SET team_id = 999 WHERE fact_id = 1;")
            .unwrap();

        let err = verify(&store, &VerifyOptions::default()).unwrap_err();
        match err {
            PipelineError::Integrity(report) => {
                assert_eq!(report.violations.len(), 1);
                let violation = &report.violations[0];
                assert_eq!(violation.check, "foreign_key");
                assert_eq!(violation.table, "fact_driver_results");
                assert_eq!(violation.count, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_warehouse_aggregates_all_violations() {
        let store = WarehouseStore::open_in_memory().unwrap();
        store.apply_schema(SCHEMA).unwrap();

        let err = verify(&store, &VerifyOptions::default()).unwrap_err();
        match err {
            PipelineError::Integrity(report) => {
                // All six tables reported, not just the first.
                assert_eq!(report.violations.len(), 6);
                assert!(report.violations.iter().all(|v| v.check == "non_empty"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn expected_driver_fact_count_is_strict_when_configured() {
        let store = populated_store();
        let options = VerifyOptions {
            expected_driver_facts: Some(384),
            ..Default::default()
        };
        let err = verify(&store, &options).unwrap_err();
        match err {
            PipelineError::Integrity(report) => {
                assert_eq!(report.violations.len(), 1);
                assert_eq!(report.violations[0].check, "expected_count");
                assert_eq!(report.violations[0].count, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unreferenced_dimension_rows_warn_but_pass() {
        let store = populated_store();
        store
            .apply_schema("INSERT INTO dim_driver VALUES (3, 'Michael Schumacher');")
            .unwrap();

        let report = verify(&store, &VerifyOptions::default()).unwrap();
        assert!(report.violations.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].table, "dim_driver");
    }
}
