use rusqlite::{params_from_iter, Connection};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::table::{Table, Value};

/// The single writer over the embedded warehouse. Dimension and fact tables
/// are write-once per load; a fresh load builds a new file instead of
/// mutating in place.
pub struct WarehouseStore {
    conn: Connection,
}

impl WarehouseStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Apply the external schema resource verbatim. The resource uses
    /// CREATE TABLE IF NOT EXISTS statements, so this is idempotent.
    pub fn create_schema(&self, schema_path: &Path) -> Result<()> {
        if !schema_path.exists() {
            return Err(PipelineError::SourceNotFound(schema_path.to_path_buf()));
        }
        let sql = fs::read_to_string(schema_path)?;
        self.apply_schema(&sql)
    }

    pub fn apply_schema(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        info!("warehouse schema applied");
        Ok(())
    }

    /// Append every row of the table in a single transaction. A constraint
    /// violation aborts the whole append.
    pub fn append(&mut self, table: &Table) -> Result<usize> {
        let column_list = table
            .columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=table.columns().len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.name(),
            column_list,
            placeholders
        );

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in table.rows() {
                stmt.execute(params_from_iter(row.iter().map(sql_value)))?;
            }
        }
        tx.commit()?;

        info!(table = table.name(), rows = table.row_count(), "appended rows");
        Ok(table.row_count())
    }

    pub fn count(&self, table_name: &str) -> Result<i64> {
        self.scalar(&format!("SELECT COUNT(*) FROM {table_name}"))
    }

    /// Read-only query surface shared with the integrity verifier.
    pub fn scalar(&self, sql: &str) -> Result<i64> {
        let value = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(value)
    }
}

fn sql_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Int(v) => rusqlite::types::Value::Integer(*v),
        Value::Float(v) => rusqlite::types::Value::Real(*v),
        Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Date(d) => rusqlite::types::Value::Text(d.format("%Y-%m-%d").to_string()),
        Value::Bool(b) => rusqlite::types::Value::Integer(i64::from(*b)),
    }
}
