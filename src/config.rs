//! Pipeline configuration: JSON file plus `PIPELINE_*` environment overrides.

use std::{fs, path::Path, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSavePolicy {
    /// Write this run's cache over the snapshot. Concurrent runs lose each other's entries.
    Overwrite,
    /// Re-read the snapshot right before writing and keep entries this run never saw.
    Merge,
}

impl Default for CacheSavePolicy {
    fn default() -> Self {
        CacheSavePolicy::Overwrite
    }
}

impl FromStr for CacheSavePolicy {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(CacheSavePolicy::Overwrite),
            "merge" => Ok(CacheSavePolicy::Merge),
            other => Err(PipelineError::config(format!(
                "unknown cache save policy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path, optionally prefixed with `sqlite://`; `:memory:` is accepted.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "data/usage.sqlite3".into(),
            username: None,
            password: None,
        }
    }
}

impl DatabaseConfig {
    pub fn path(&self) -> PathBuf {
        PathBuf::from(self.url.strip_prefix("sqlite://").unwrap_or(&self.url))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.opencagedata.com".into(),
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub object_store_root: PathBuf,
    pub staging_bucket: String,
    pub cache_bucket: String,
    pub cache_key: String,
    pub database: DatabaseConfig,
    pub geocoder: GeocoderConfig,
    pub batch_size: usize,
    pub input_has_header: bool,
    pub cache_save_policy: CacheSavePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            object_store_root: PathBuf::from("buckets"),
            staging_bucket: "load.tlq".into(),
            cache_bucket: "recurring-cities.tlq".into(),
            cache_key: "recurring-cities".into(),
            database: DatabaseConfig::default(),
            geocoder: GeocoderConfig::default(),
            batch_size: 1000,
            input_has_header: false,
            cache_save_policy: CacheSavePolicy::default(),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|err| PipelineError::config(format!("{name}='{value}': {err}")))
}

impl PipelineConfig {
    /// Loads the JSON file if given, then applies environment overrides and validates.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = fs::read_to_string(path).map_err(|err| {
                    PipelineError::config(format!("failed to read {}: {err}", path.display()))
                })?;
                serde_json::from_str(&contents).map_err(|err| {
                    PipelineError::config(format!("failed to parse {}: {err}", path.display()))
                })?
            }
            None => PipelineConfig::default(),
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `PIPELINE_*` overrides resolved through `var`.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = var("PIPELINE_OBJECT_STORE_ROOT") {
            self.object_store_root = PathBuf::from(value);
        }
        if let Some(value) = var("PIPELINE_STAGING_BUCKET") {
            self.staging_bucket = value;
        }
        if let Some(value) = var("PIPELINE_CACHE_BUCKET") {
            self.cache_bucket = value;
        }
        if let Some(value) = var("PIPELINE_CACHE_KEY") {
            self.cache_key = value;
        }
        if let Some(value) = var("PIPELINE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = var("PIPELINE_DATABASE_USERNAME") {
            self.database.username = Some(value);
        }
        if let Some(value) = var("PIPELINE_DATABASE_PASSWORD") {
            self.database.password = Some(value);
        }
        if let Some(value) = var("PIPELINE_GEOCODER_API_KEY") {
            self.geocoder.api_key = value;
        }
        if let Some(value) = var("PIPELINE_GEOCODER_BASE_URL") {
            self.geocoder.base_url = value;
        }
        if let Some(value) = var("PIPELINE_GEOCODER_TIMEOUT_SECONDS") {
            self.geocoder.timeout_seconds = parse_var("PIPELINE_GEOCODER_TIMEOUT_SECONDS", &value)?;
        }
        if let Some(value) = var("PIPELINE_BATCH_SIZE") {
            self.batch_size = parse_var("PIPELINE_BATCH_SIZE", &value)?;
        }
        if let Some(value) = var("PIPELINE_INPUT_HAS_HEADER") {
            self.input_has_header = parse_var("PIPELINE_INPUT_HAS_HEADER", &value)?;
        }
        if let Some(value) = var("PIPELINE_CACHE_SAVE_POLICY") {
            self.cache_save_policy = value.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::config("batch_size must be greater than zero"));
        }
        for (name, value) in [
            ("staging_bucket", &self.staging_bucket),
            ("cache_bucket", &self.cache_bucket),
            ("cache_key", &self.cache_key),
            ("database.url", &self.database.url),
            ("geocoder.base_url", &self.geocoder.base_url),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::config(format!("{name} is required")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_deployment() {
        let config = PipelineConfig::default();
        assert_eq!(config.staging_bucket, "load.tlq");
        assert_eq!(config.cache_bucket, "recurring-cities.tlq");
        assert_eq!(config.cache_key, "recurring-cities");
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.cache_save_policy, CacheSavePolicy::Overwrite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("PIPELINE_BATCH_SIZE", "250"),
            ("PIPELINE_DATABASE_URL", "sqlite:///tmp/x.db"),
            ("PIPELINE_CACHE_SAVE_POLICY", "MERGE"),
            ("PIPELINE_INPUT_HAS_HEADER", "true"),
        ]);
        let mut config = PipelineConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.database.path(), PathBuf::from("/tmp/x.db"));
        assert_eq!(config.cache_save_policy, CacheSavePolicy::Merge);
        assert!(config.input_has_header);
    }

    #[test]
    fn bad_override_is_config_error() {
        let mut config = PipelineConfig::default();
        let err = config
            .apply_overrides(|name| (name == "PIPELINE_BATCH_SIZE").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = PipelineConfig {
            batch_size: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "batch_size": 10, "geocoder": { "api_key": "k" } }"#)
                .unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.geocoder.api_key, "k");
        assert_eq!(config.geocoder.timeout_seconds, 10);
        assert_eq!(config.staging_bucket, "load.tlq");
    }
}
