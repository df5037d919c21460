use tracing::info;

use crate::error::{PipelineError, Result};
use crate::table::{Table, Value};

/// A declarative quality rule evaluated against a normalized table.
#[derive(Debug, Clone)]
pub enum QualityRule {
    NotEmpty,
    RequiredColumns(Vec<&'static str>),
    YearInRange {
        column: &'static str,
        min: i64,
        max: i64,
    },
    TextNotBlank {
        column: &'static str,
    },
}

pub fn results_rules() -> Vec<QualityRule> {
    vec![
        QualityRule::NotEmpty,
        QualityRule::RequiredColumns(vec![
            "year",
            "grand_prix",
            "race_number",
            "team",
            "grid_position",
            "race_position",
        ]),
        QualityRule::YearInRange {
            column: "year",
            min: 1900,
            max: 2100,
        },
        QualityRule::TextNotBlank {
            column: "grand_prix",
        },
    ]
}

pub fn winners_rules() -> Vec<QualityRule> {
    vec![
        QualityRule::NotEmpty,
        QualityRule::RequiredColumns(vec!["year", "grand_prix", "winner_name", "team", "date"]),
        QualityRule::YearInRange {
            column: "year",
            min: 1900,
            max: 2100,
        },
        QualityRule::TextNotBlank {
            column: "grand_prix",
        },
    ]
}

/// Evaluate the rules in order, aborting on the first failure. A failing
/// check is fatal to the run; no partial loads.
pub fn validate(table: &Table, rules: &[QualityRule]) -> Result<()> {
    for rule in rules {
        check_rule(table, rule)?;
    }
    info!(dataset = table.name(), rules = rules.len(), "quality gate passed");
    Ok(())
}

fn check_rule(table: &Table, rule: &QualityRule) -> Result<()> {
    match rule {
        QualityRule::NotEmpty => {
            if table.is_empty() {
                return Err(fail(table, format!("{} is empty", table.name())));
            }
        }
        QualityRule::RequiredColumns(required) => {
            let missing: Vec<&&str> = required
                .iter()
                .filter(|c| !table.has_column(c))
                .collect();
            if !missing.is_empty() {
                return Err(fail(
                    table,
                    format!("{} missing columns: {:?}", table.name(), missing),
                ));
            }
        }
        QualityRule::YearInRange { column, min, max } => {
            let idx = table.column_index(column)?;
            for row in table.rows() {
                match &row[idx] {
                    Value::Int(year) if (*min..=*max).contains(year) => {}
                    Value::Null => {
                        return Err(fail(table, format!("{} has NULL years", table.name())));
                    }
                    other => {
                        return Err(fail(
                            table,
                            format!("{} has out-of-range year {:?}", table.name(), other),
                        ));
                    }
                }
            }
        }
        QualityRule::TextNotBlank { column } => {
            let idx = table.column_index(column)?;
            for row in table.rows() {
                let blank = match &row[idx] {
                    Value::Text(s) => s.trim().is_empty(),
                    Value::Null => true,
                    _ => false,
                };
                if blank {
                    return Err(fail(
                        table,
                        format!("{} has NULL/blank {}", table.name(), column),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn fail(table: &Table, detail: String) -> PipelineError {
    PipelineError::DataQuality {
        dataset: table.name().to_string(),
        detail,
    }
}
