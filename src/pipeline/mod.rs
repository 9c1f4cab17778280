//! The three pipeline stages and their shared context.
//!
//! `transform` enriches a source object into a staged file, `load` persists a
//! staged file, `run` does both without staging, and `query` answers aggregate
//! requests over the loaded table.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::db::Database;
use crate::error::{PipelineError, Result};
use crate::loader::{BatchLoader, LoadReport};
use crate::location::{CacheStats, CacheStore, Geocoder, OpenCageGeocoder};
use crate::models::{EnrichedRow, ENRICHED_COLUMNS};
use crate::query::{run_query, QueryResult, QuerySpec};
use crate::storage::{LocalObjectStore, ObjectStore};
use crate::tabular::{TabularReader, TabularWriter};
use crate::transform::Transformer;

const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Collaborators shared by every stage.
pub struct PipelineContext {
    config: PipelineConfig,
    store: Arc<dyn ObjectStore>,
    geocoder: Arc<dyn Geocoder>,
    db: Database,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Transform,
    Load,
    Run,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub run_id: Uuid,
    pub stage: Stage,
    pub bucket: String,
    pub key: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
}

impl StageReport {
    fn begin(stage: Stage, bucket: &str, key: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            stage,
            bucket: bucket.to_string(),
            key: key.to_string(),
            started_at: now,
            finished_at: now,
            rows: 0,
            load: None,
            cache: None,
        }
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        log_info!(
            "[{}] {:?} of {}/{} finished: {} rows in {} ms",
            self.run_id,
            self.stage,
            self.bucket,
            self.key,
            self.rows,
            (self.finished_at - self.started_at).num_milliseconds()
        );
        if let Some(cache) = &self.cache {
            log_info!(
                "[{}] Location cache: {} hits, {} misses, {} failed lookups",
                self.run_id,
                cache.hits,
                cache.misses,
                cache.lookup_failures
            );
        }
        self
    }
}

fn decode_text(bytes: Vec<u8>, bucket: &str, key: &str) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|err| PipelineError::storage(format!("{bucket}/{key} is not valid UTF-8: {err}")))
}

impl PipelineContext {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn ObjectStore>,
        geocoder: Arc<dyn Geocoder>,
        db: Database,
    ) -> Self {
        Self {
            config,
            store,
            geocoder,
            db,
        }
    }

    /// Wires the local object store, the OpenCage geocoder and the SQLite store.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let store: Arc<dyn ObjectStore> =
            Arc::new(LocalObjectStore::new(config.object_store_root.clone()));
        let geocoder: Arc<dyn Geocoder> =
            Arc::new(OpenCageGeocoder::new(config.geocoder.clone())?);
        let db = Database::open(&config.database)
            .map_err(|err| PipelineError::config(format!("{err:#}")))?;
        Ok(Self::new(config, store, geocoder, db))
    }

    fn cache_store(&self) -> CacheStore {
        CacheStore::new(
            self.store.clone(),
            self.config.cache_bucket.clone(),
            self.config.cache_key.clone(),
            self.config.cache_save_policy,
        )
    }

    fn loader(&self) -> BatchLoader {
        BatchLoader::new(self.db.clone(), self.config.batch_size)
    }

    fn read_object(&self, bucket: &str, key: &str) -> Result<String> {
        let bytes = self.store.get(bucket, key)?;
        decode_text(bytes, bucket, key)
    }

    /// Enriches `bucket/key` into the staging bucket under the same key, then
    /// deletes the source object and saves the location cache.
    pub async fn transform(&self, bucket: &str, key: &str) -> Result<StageReport> {
        if bucket == self.config.staging_bucket {
            return Err(PipelineError::storage(format!(
                "cannot transform {bucket}/{key}: source bucket is the staging bucket"
            )));
        }

        let mut report = StageReport::begin(Stage::Transform, bucket, key);
        log_info!("[{}] Transforming {}/{}", report.run_id, bucket, key);

        let cache_store = self.cache_store();
        let mut cache = cache_store.load()?;
        let text = self.read_object(bucket, key)?;

        let mut staged = TabularWriter::with_header(&ENRICHED_COLUMNS);
        {
            let records = TabularReader::new(&text, self.config.input_has_header);
            let mut transformer = Transformer::new(records, &mut cache, self.geocoder.as_ref());
            while let Some(row) = transformer.next_row().await {
                staged.write_record(&row?.to_fields());
            }
        }

        report.rows = staged.records();
        self.store
            .put(&self.config.staging_bucket, key, &staged.into_bytes())?;
        self.store.delete(bucket, key)?;
        cache_store.save(&mut cache)?;

        report.cache = Some(cache.stats());
        Ok(report.finish())
    }

    /// Loads a staged file from `bucket/key` and deletes it once every batch committed.
    pub async fn load(&self, bucket: &str, key: &str) -> Result<StageReport> {
        let mut report = StageReport::begin(Stage::Load, bucket, key);
        log_info!("[{}] Loading {}/{}", report.run_id, bucket, key);

        let text = self.read_object(bucket, key)?;
        let loader = self.loader();
        loader.ensure_schema().await?;

        let mut writer = loader.writer();
        for record in TabularReader::new(&text, true) {
            let record = record?;
            writer
                .push(EnrichedRow::from_fields(record.line, &record.fields)?)
                .await?;
        }
        let load = writer.finish().await?;

        self.store.delete(bucket, key)?;

        report.rows = load.rows_inserted;
        report.load = Some(load);
        Ok(report.finish())
    }

    /// Transforms `bucket/key` and streams the rows straight into the table.
    pub async fn run(&self, bucket: &str, key: &str) -> Result<StageReport> {
        let mut report = StageReport::begin(Stage::Run, bucket, key);
        log_info!("[{}] Running full pipeline on {}/{}", report.run_id, bucket, key);

        let cache_store = self.cache_store();
        let mut cache = cache_store.load()?;
        let text = self.read_object(bucket, key)?;

        let loader = self.loader();
        loader.ensure_schema().await?;

        let load = {
            let records = TabularReader::new(&text, self.config.input_has_header);
            let mut transformer = Transformer::new(records, &mut cache, self.geocoder.as_ref());
            let mut writer = loader.writer();
            while let Some(row) = transformer.next_row().await {
                writer.push(row?).await?;
            }
            writer.finish().await?
        };

        self.store.delete(bucket, key)?;
        cache_store.save(&mut cache)?;

        report.rows = load.rows_inserted;
        report.load = Some(load);
        report.cache = Some(cache.stats());
        Ok(report.finish())
    }

    pub async fn query(&self, spec: &QuerySpec) -> Result<QueryResult> {
        let result = run_query(&self.db, spec).await?;
        log_info!("Query returned {} row(s)", result.rows.len());
        Ok(result)
    }
}
