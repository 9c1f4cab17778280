//! Transform-load-query pipeline for mobile app usage survey files.
//!
//! A source CSV is enriched row by row (usage shares plus a geocoded region and
//! country, memoized in a persisted location cache), loaded into SQLite in
//! fixed-size batches, and queried through a small declarative aggregate
//! vocabulary compiled to parameterized SQL.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod loader;
pub mod location;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod storage;
pub mod tabular;
pub mod transform;
mod utils;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{PipelineContext, StageReport};
