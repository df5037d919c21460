use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::extract::RawTable;
use crate::table::{col, ColumnDef, ColumnType, Table, Value};

/// Casing applied to a text column after trimming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasePolicy {
    Preserve,
    /// Person names: first letter of each word upper, rest lower.
    Title,
    /// Free-text keys used in joins.
    Lower,
}

/// One column the pipeline expects from a source.
#[derive(Debug, Clone)]
pub struct SourceColumn {
    pub name: &'static str,
    pub ty: ColumnType,
    pub case: CasePolicy,
    /// A required column missing from the source headers is a SchemaError.
    pub required: bool,
    /// Markers treated as an explicit null (e.g. an abandon code in a
    /// position column).
    pub null_markers: &'static [&'static str],
}

impl SourceColumn {
    fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            case: CasePolicy::Preserve,
            required: false,
            null_markers: &[],
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn case(mut self, case: CasePolicy) -> Self {
        self.case = case;
        self
    }

    fn null_markers(mut self, markers: &'static [&'static str]) -> Self {
        self.null_markers = markers;
        self
    }
}

/// Declarative description of one source table.
#[derive(Debug, Clone)]
pub struct SourceSchema {
    pub name: &'static str,
    pub columns: Vec<SourceColumn>,
}

/// Schema of the subject driver's race-by-race results source.
pub fn results_schema() -> SourceSchema {
    SourceSchema {
        name: "results",
        columns: vec![
            SourceColumn::new("year", ColumnType::Int).required(),
            SourceColumn::new("race_number", ColumnType::Int).required(),
            SourceColumn::new("grand_prix", ColumnType::Text)
                .case(CasePolicy::Lower)
                .required(),
            SourceColumn::new("team", ColumnType::Text).required(),
            SourceColumn::new("grid_position", ColumnType::Int),
            SourceColumn::new("race_position", ColumnType::Int).null_markers(&["ab"]),
            SourceColumn::new("event", ColumnType::Text),
        ],
    }
}

/// Schema of the per-race winners source.
pub fn winners_schema() -> SourceSchema {
    SourceSchema {
        name: "winners",
        columns: vec![
            SourceColumn::new("year", ColumnType::Int).required(),
            SourceColumn::new("date", ColumnType::Date).required(),
            SourceColumn::new("grand_prix", ColumnType::Text)
                .case(CasePolicy::Lower)
                .required(),
            SourceColumn::new("circuit", ColumnType::Text),
            SourceColumn::new("continent", ColumnType::Text),
            SourceColumn::new("winner_name", ColumnType::Text)
                .case(CasePolicy::Title)
                .required(),
            SourceColumn::new("team", ColumnType::Text).required(),
            SourceColumn::new("laps", ColumnType::Int),
            SourceColumn::new("time", ColumnType::Text),
        ],
    }
}

/// Normalize a raw table against a source schema. Row-count preserving:
/// unparsable cells become nulls, never dropped rows.
pub fn normalize(raw: &RawTable, schema: &SourceSchema) -> Result<Table> {
    let header_index: HashMap<&str, usize> = raw
        .headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.as_str(), i))
        .collect();

    let mut indices = Vec::with_capacity(schema.columns.len());
    for column in &schema.columns {
        let idx = header_index.get(column.name).copied();
        if idx.is_none() && column.required {
            return Err(PipelineError::Schema {
                table: schema.name.to_string(),
                detail: format!("required column '{}' not found in source", column.name),
            });
        }
        indices.push(idx);
    }

    let defs: Vec<ColumnDef> = schema.columns.iter().map(|c| col(c.name, c.ty)).collect();
    let mut table = Table::new(schema.name, defs);

    for row in &raw.rows {
        let mut values = Vec::with_capacity(schema.columns.len());
        for (column, idx) in schema.columns.iter().zip(&indices) {
            let cell = idx.and_then(|i| row.get(i)).map(String::as_str).unwrap_or("");
            values.push(coerce(cell, column));
        }
        table.push_row(values)?;
    }

    debug!(source = schema.name, rows = table.row_count(), "normalized table");
    Ok(table)
}

/// Normalize the results source and derive the `did_finish` flag from the
/// finishing position.
pub fn normalize_results(raw: &RawTable) -> Result<Table> {
    let normalized = normalize(raw, &results_schema())?;
    let position = normalized.column_index("race_position")?;

    let mut defs = normalized.columns().to_vec();
    defs.push(col("did_finish", ColumnType::Bool));
    let mut table = Table::new("results", defs);
    for row in normalized.rows() {
        let mut values = row.clone();
        values.push(Value::Bool(!row[position].is_null()));
        table.push_row(values)?;
    }
    Ok(table)
}

pub fn normalize_winners(raw: &RawTable) -> Result<Table> {
    normalize(raw, &winners_schema())
}

fn coerce(cell: &str, column: &SourceColumn) -> Value {
    let cleaned = clean_text(cell);
    if cleaned.is_empty() {
        return Value::Null;
    }
    if column
        .null_markers
        .iter()
        .any(|m| cleaned.eq_ignore_ascii_case(m))
    {
        return Value::Null;
    }

    match column.ty {
        ColumnType::Text => Value::Text(apply_case(&cleaned, column.case)),
        ColumnType::Int => parse_int(&cleaned),
        ColumnType::Float => cleaned.parse::<f64>().map(Value::Float).unwrap_or(Value::Null),
        ColumnType::Date => parse_date(&cleaned),
        ColumnType::Bool => parse_bool(&cleaned),
    }
}

/// Strip whitespace and replace non-breaking-space artifacts.
fn clean_text(s: &str) -> String {
    s.replace('\u{a0}', " ").trim().to_string()
}

fn apply_case(s: &str, case: CasePolicy) -> String {
    match case {
        CasePolicy::Preserve => s.to_string(),
        CasePolicy::Lower => s.to_lowercase(),
        CasePolicy::Title => title_case(s),
    }
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical form of a configured person name, matching the normalizer's
/// treatment of name columns.
pub fn canonical_name(s: &str) -> String {
    title_case(&clean_text(s))
}

/// Coercive integer parse: accepts integral floats ("3.0"), rejects the rest.
fn parse_int(s: &str) -> Value {
    if let Ok(v) = s.parse::<i64>() {
        return Value::Int(v);
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 => Value::Int(f as i64),
        _ => Value::Null,
    }
}

fn parse_date(s: &str) -> Value {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d/%m/%Y"))
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .map(Value::Date)
        .unwrap_or(Value::Null)
}

fn parse_bool(s: &str) -> Value {
    match s.to_lowercase().as_str() {
        "true" | "yes" | "1" => Value::Bool(true),
        "false" | "no" | "0" => Value::Bool(false),
        _ => Value::Null,
    }
}
