use anyhow::{Context, Result};
use rusqlite::{params_from_iter, types::Value as SqlValue};
use serde_json::{Map, Value as JsonValue};

use crate::db::{connection::Database, helpers::sql_to_json};

/// One result row: column name → value.
pub type ResultRow = Map<String, JsonValue>;

impl Database {
    /// Runs a read statement with positional parameters and returns every row
    /// keyed by the result set's own column names.
    pub async fn fetch_rows(&self, sql: String, params: Vec<SqlValue>) -> Result<Vec<ResultRow>> {
        self.execute(move |conn| {
            let mut stmt = conn
                .prepare(&sql)
                .with_context(|| format!("failed to prepare '{sql}'"))?;
            let column_names: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect();

            let mut rows = stmt
                .query(params_from_iter(params.iter()))
                .context("failed to run query")?;

            let mut results = Vec::new();
            while let Some(row) = rows.next().context("failed to read result row")? {
                let mut mapped = Map::with_capacity(column_names.len());
                for (index, name) in column_names.iter().enumerate() {
                    mapped.insert(name.clone(), sql_to_json(row.get_ref(index)?));
                }
                results.push(mapped);
            }

            Ok(results)
        })
        .await
    }
}
