//! Aggregate queries over the loaded rows.

pub mod compiler;
pub mod spec;

use log::debug;
use serde::Serialize;

use crate::db::{helpers::describe, repositories::aggregates::ResultRow, Database};
use crate::error::{PipelineError, Result};

pub use compiler::{compile, CompiledQuery, QueryPlan};
pub use spec::{Aggregation, Filter, QuerySpec};

/// Rows in the order the store returned them.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub statement: String,
    pub rows: Vec<ResultRow>,
}

/// Compiles `spec` and runs it. Compilation errors surface before anything is
/// sent to the store; execution errors return no partial rows.
pub async fn run_query(db: &Database, spec: &QuerySpec) -> Result<QueryResult> {
    let CompiledQuery { sql, params } = compile(spec)?;
    debug!("Compiled query: {sql} with {} parameter(s)", params.len());

    let rows = db
        .fetch_rows(sql.clone(), params)
        .await
        .map_err(|err| PipelineError::QueryExecution(describe(&err)))?;

    Ok(QueryResult {
        statement: sql,
        rows,
    })
}
