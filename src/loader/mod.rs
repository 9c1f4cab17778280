//! Chunked persistence of enriched rows.

use std::mem;

use serde::Serialize;

use crate::db::{helpers::describe, Database};
use crate::error::{PipelineError, Result};
use crate::models::EnrichedRow;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub rows_inserted: usize,
    /// Row count of every committed batch, in commit order.
    pub batch_sizes: Vec<usize>,
}

/// Writes enriched rows to the `data` table in fixed-size transactions.
#[derive(Clone)]
pub struct BatchLoader {
    db: Database,
    batch_size: usize,
}

impl BatchLoader {
    pub fn new(db: Database, batch_size: usize) -> Self {
        Self {
            db,
            batch_size: batch_size.max(1),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Idempotent `CREATE TABLE IF NOT EXISTS`.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.db
            .ensure_schema()
            .await
            .map_err(|err| PipelineError::Schema(describe(&err)))
    }

    /// Streaming writer that commits a batch every `batch_size` rows.
    pub fn writer(&self) -> BatchWriter<'_> {
        BatchWriter {
            loader: self,
            pending: Vec::with_capacity(self.batch_size),
            report: LoadReport::default(),
        }
    }

    /// Inserts all `rows`, one transaction per chunk. The first failing chunk
    /// aborts the load; chunks committed before it stay in the table.
    pub async fn load_batch(&self, rows: Vec<EnrichedRow>) -> Result<LoadReport> {
        let mut writer = self.writer();
        for row in rows {
            writer.push(row).await?;
        }
        writer.finish().await
    }
}

pub struct BatchWriter<'a> {
    loader: &'a BatchLoader,
    pending: Vec<EnrichedRow>,
    report: LoadReport,
}

impl<'a> BatchWriter<'a> {
    pub async fn push(&mut self, row: EnrichedRow) -> Result<()> {
        self.pending.push(row);
        if self.pending.len() >= self.loader.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let batch_index = self.report.batch_sizes.len();
        let batch = mem::replace(&mut self.pending, Vec::with_capacity(self.loader.batch_size));
        let size = batch.len();

        match self.loader.db.insert_enriched_rows(batch).await {
            Ok(inserted) => {
                self.report.rows_inserted += inserted;
                self.report.batch_sizes.push(size);
                log_info!("Committed batch {} ({} rows)", batch_index, inserted);
                Ok(())
            }
            Err(err) => {
                let message = describe(&err);
                log_error!("Batch {} failed: {}", batch_index, message);
                Err(PipelineError::BatchInsert {
                    batch_index,
                    message,
                })
            }
        }
    }

    /// Commits any remaining rows and returns the totals.
    pub async fn finish(mut self) -> Result<LoadReport> {
        self.flush().await?;
        Ok(self.report)
    }
}
