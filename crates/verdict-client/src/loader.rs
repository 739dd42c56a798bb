//! Host-side table loaders
//!
//! A [`Loader`] turns a key into raw table bytes. The native core calls it
//! synchronously, on the thread that triggered resolution, zero or more
//! times per `get_decision` or `evaluate` call. Implementations shared by an
//! engine must tolerate concurrent calls.

use std::path::{Component, Path, PathBuf};

use dashmap::DashMap;
use thiserror::Error;

/// Errors a loader reports back to the native core
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("decision not found: {key}")]
    NotFound { key: String },

    #[error("failed to read decision {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{message}")]
    Internal { key: String, message: String },
}

impl LoaderError {
    pub fn not_found(key: impl Into<String>) -> Self {
        LoaderError::NotFound { key: key.into() }
    }

    pub fn internal(key: impl Into<String>, message: impl Into<String>) -> Self {
        LoaderError::Internal {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            LoaderError::NotFound { key }
            | LoaderError::Io { key, .. }
            | LoaderError::Internal { key, .. } => key,
        }
    }
}

/// Resolves a key into raw table bytes
pub trait Loader: Send + Sync {
    fn load(&self, key: &str) -> Result<Vec<u8>, LoaderError>;
}

impl<F> Loader for F
where
    F: Fn(&str) -> Result<Vec<u8>, LoaderError> + Send + Sync,
{
    fn load(&self, key: &str) -> Result<Vec<u8>, LoaderError> {
        self(key)
    }
}

/// In-memory loader; tables are added programmatically.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    decisions: DashMap<String, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decision(self, key: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.add_decision(key, content);
        self
    }

    pub fn add_decision(&self, key: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.decisions.insert(key.into(), content.into());
    }

    pub fn remove_decision(&self, key: &str) -> bool {
        self.decisions.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }
}

impl Loader for MemoryLoader {
    fn load(&self, key: &str) -> Result<Vec<u8>, LoaderError> {
        self.decisions
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LoaderError::not_found(key))
    }
}

/// Loads tables from files below a root directory, caching contents by default.
#[derive(Debug)]
pub struct FilesystemLoader {
    root: PathBuf,
    cache: Option<DashMap<String, Vec<u8>>>,
}

impl FilesystemLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Some(DashMap::new()),
        }
    }

    pub fn without_cache(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    pub fn evict(&self, key: &str) -> bool {
        self.cache
            .as_ref()
            .map(|cache| cache.remove(key).is_some())
            .unwrap_or(false)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.as_ref().map(|cache| cache.len()).unwrap_or(0)
    }

    /// Keys must stay below the root: no absolute paths, no `..`.
    fn resolve(&self, key: &str) -> Result<PathBuf, LoaderError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if key.is_empty() || escapes {
            return Err(LoaderError::internal(
                key,
                format!("invalid decision key: {}", key),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl Loader for FilesystemLoader {
    fn load(&self, key: &str) -> Result<Vec<u8>, LoaderError> {
        if let Some(content) = self.cache.as_ref().and_then(|cache| cache.get(key)) {
            return Ok(content.value().clone());
        }

        let path = self.resolve(key)?;
        let content = std::fs::read(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => LoaderError::not_found(key),
            _ => LoaderError::Io {
                key: key.to_string(),
                source,
            },
        })?;

        if let Some(cache) = &self.cache {
            cache.insert(key.to_string(), content.clone());
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_closure_loader() {
        let loader = |key: &str| -> Result<Vec<u8>, LoaderError> {
            match key {
                "a.json" => Ok(b"{}".to_vec()),
                _ => Err(LoaderError::not_found(key)),
            }
        };

        assert_eq!(loader.load("a.json").unwrap(), b"{}");
        assert_eq!(
            loader.load("b.json").unwrap_err().to_string(),
            "decision not found: b.json"
        );
    }

    #[test]
    fn test_memory_loader() {
        let loader = MemoryLoader::new().with_decision("a.json", "{}");
        assert_eq!(loader.len(), 1);
        assert_eq!(loader.load("a.json").unwrap(), b"{}");

        assert!(loader.remove_decision("a.json"));
        assert!(loader.is_empty());
        assert!(matches!(
            loader.load("a.json"),
            Err(LoaderError::NotFound { .. })
        ));
    }

    #[test]
    fn test_filesystem_loader_reads_and_caches() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/table.json"), b"{\"rules\":[]}").unwrap();

        let loader = FilesystemLoader::new(dir.path());
        assert_eq!(loader.load("nested/table.json").unwrap(), b"{\"rules\":[]}");
        assert_eq!(loader.cached_len(), 1);

        // Served from cache once the file is gone
        std::fs::remove_file(dir.path().join("nested/table.json")).unwrap();
        assert!(loader.load("nested/table.json").is_ok());

        assert!(loader.evict("nested/table.json"));
        assert!(matches!(
            loader.load("nested/table.json"),
            Err(LoaderError::NotFound { .. })
        ));
    }

    #[test]
    fn test_filesystem_loader_without_cache() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("t.json"), b"1").unwrap();

        let loader = FilesystemLoader::without_cache(dir.path());
        assert_eq!(loader.load("t.json").unwrap(), b"1");
        assert_eq!(loader.cached_len(), 0);
        assert!(!loader.evict("t.json"));
    }

    #[test]
    fn test_filesystem_loader_rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let loader = FilesystemLoader::new(dir.path());

        for key in ["../secret.json", "/etc/passwd", "a/../../b", ""] {
            let err = loader.load(key).unwrap_err();
            assert!(matches!(err, LoaderError::Internal { .. }), "{}", key);
        }
    }

    #[test]
    fn test_error_key() {
        assert_eq!(LoaderError::not_found("x").key(), "x");
        assert_eq!(LoaderError::internal("y", "boom").key(), "y");
        assert_eq!(LoaderError::internal("y", "boom").to_string(), "boom");
    }
}
