use chrono::NaiveDate;
use std::cmp::Ordering;

use crate::error::{PipelineError, Result};

/// Column families supported by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Text,
    Date,
    Bool,
}

/// A single strongly-typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Bool(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Hashable projection used for join keys and deduplication.
    /// Nulls and floats do not participate in natural keys.
    pub fn as_key(&self) -> Option<KeyValue> {
        match self {
            Value::Int(v) => Some(KeyValue::Int(*v)),
            Value::Text(s) => Some(KeyValue::Text(s.clone())),
            Value::Date(d) => Some(KeyValue::Date(*d)),
            Value::Bool(b) => Some(KeyValue::Bool(*b)),
            Value::Null | Value::Float(_) => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Int(_) => 0,
            Value::Float(_) => 1,
            Value::Text(_) => 2,
            Value::Date(_) => 3,
            Value::Bool(_) => 4,
            Value::Null => 5,
        }
    }

    /// Total ordering for deterministic sorts; nulls sort last.
    pub fn key_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Owned, hashable natural-key component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Int(i64),
    Text(String),
    Date(NaiveDate),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
}

pub fn col(name: &str, ty: ColumnType) -> ColumnDef {
    ColumnDef {
        name: name.to_string(),
        ty,
    }
}

/// An in-memory tabular value with a fixed, named column schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<ColumnDef>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| PipelineError::Schema {
                table: self.name.clone(),
                detail: format!("column '{name}' not found"),
            })
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(PipelineError::Schema {
                table: self.name.clone(),
                detail: format!(
                    "row has {} values, schema has {} columns",
                    row.len(),
                    self.columns.len()
                ),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn value(&self, row: usize, column: &str) -> Result<&Value> {
        let idx = self.column_index(column)?;
        Ok(&self.rows[row][idx])
    }

    /// Project (and rename) columns into a new table. A source column that
    /// does not exist materializes as all-null.
    pub fn project(&self, name: &str, columns: &[(&str, &str, ColumnType)]) -> Table {
        let defs = columns
            .iter()
            .map(|(_, dst, ty)| col(dst, *ty))
            .collect::<Vec<_>>();
        let indices: Vec<Option<usize>> = columns
            .iter()
            .map(|(src, _, _)| self.columns.iter().position(|c| c.name == *src))
            .collect();

        let mut out = Table::new(name, defs);
        for row in &self.rows {
            let projected = indices
                .iter()
                .map(|idx| match idx {
                    Some(i) => row[*i].clone(),
                    None => Value::Null,
                })
                .collect();
            // Arity matches by construction.
            out.rows.push(projected);
        }
        out
    }

    /// Stable sort of the rows by the named columns, nulls last.
    pub fn sort_by_columns(&mut self, columns: &[&str]) -> Result<()> {
        let indices: Vec<usize> = columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Result<_>>()?;
        self.rows
            .sort_by(|a, b| cmp_rows_at(a, b, &indices));
        Ok(())
    }
}

/// Compare two rows at the given column indices, in order.
pub fn cmp_rows_at(a: &[Value], b: &[Value], indices: &[usize]) -> Ordering {
    for &i in indices {
        let ord = a[i].key_cmp(&b[i]);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut t = Table::new(
            "sample",
            vec![col("year", ColumnType::Int), col("name", ColumnType::Text)],
        );
        t.push_row(vec![Value::Int(2006), Value::Text("b".into())])
            .unwrap();
        t.push_row(vec![Value::Int(2005), Value::Text("a".into())])
            .unwrap();
        t.push_row(vec![Value::Null, Value::Text("c".into())])
            .unwrap();
        t
    }

    #[test]
    fn push_row_rejects_wrong_arity() {
        let mut t = sample();
        let err = t.push_row(vec![Value::Int(1)]).unwrap_err();
        assert!(matches!(err, PipelineError::Schema { .. }));
    }

    #[test]
    fn sort_puts_nulls_last() {
        let mut t = sample();
        t.sort_by_columns(&["year"]).unwrap();
        assert_eq!(t.rows()[0][0], Value::Int(2005));
        assert_eq!(t.rows()[1][0], Value::Int(2006));
        assert!(t.rows()[2][0].is_null());
    }

    #[test]
    fn project_materializes_missing_columns_as_null() {
        let t = sample();
        let p = t.project(
            "projected",
            &[
                ("name", "label", ColumnType::Text),
                ("missing", "extra", ColumnType::Text),
            ],
        );
        assert_eq!(p.row_count(), 3);
        assert_eq!(p.value(0, "label").unwrap(), &Value::Text("b".into()));
        assert!(p.value(0, "extra").unwrap().is_null());
    }

    #[test]
    fn key_projection_skips_nulls() {
        assert_eq!(Value::Int(5).as_key(), Some(KeyValue::Int(5)));
        assert_eq!(Value::Null.as_key(), None);
    }
}
