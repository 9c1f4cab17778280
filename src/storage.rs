//! Bucket/key object storage.

use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use crate::error::{PipelineError, Result};

/// Opaque byte source/sink addressed by bucket and key.
pub trait ObjectStore: Send + Sync {
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
    fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<()>;
    fn delete(&self, bucket: &str, key: &str) -> Result<()>;
    fn exists(&self, bucket: &str, key: &str) -> Result<bool>;
}

/// Object store backed by a local directory: one subdirectory per bucket.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        validate_segment("bucket", bucket)?;
        let key_path = Path::new(key);
        if key.is_empty()
            || key_path
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(PipelineError::storage(format!("invalid object key '{key}'")));
        }
        Ok(self.root.join(bucket).join(key_path))
    }
}

fn validate_segment(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains('/') || value.contains('\\') || value == ".." {
        return Err(PipelineError::storage(format!("invalid {kind} name '{value}'")));
    }
    Ok(())
}

impl ObjectStore for LocalObjectStore {
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        fs::read(&path)
            .map_err(|err| PipelineError::storage(format!("failed to read {bucket}/{key}: {err}")))
    }

    fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                PipelineError::storage(format!("failed to create {}: {err}", parent.display()))
            })?;
        }
        fs::write(&path, bytes)
            .map_err(|err| PipelineError::storage(format!("failed to write {bucket}/{key}: {err}")))
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        fs::remove_file(&path).map_err(|err| {
            PipelineError::storage(format!("failed to delete {bucket}/{key}: {err}"))
        })
    }

    fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let path = self.object_path(bucket, key)?;
        Ok(path.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        assert!(!store.exists("raw", "survey.csv").unwrap());
        store.put("raw", "survey.csv", b"1,2,3").unwrap();
        assert!(store.exists("raw", "survey.csv").unwrap());
        assert_eq!(store.get("raw", "survey.csv").unwrap(), b"1,2,3");

        store.delete("raw", "survey.csv").unwrap();
        assert!(!store.exists("raw", "survey.csv").unwrap());
        assert!(matches!(
            store.get("raw", "survey.csv"),
            Err(PipelineError::Storage(_))
        ));
    }

    #[test]
    fn rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(store.put("raw", "../outside", b"x").is_err());
        assert!(store.put("raw", "/etc/passwd", b"x").is_err());
        assert!(store.put("../raw", "key", b"x").is_err());
    }
}
