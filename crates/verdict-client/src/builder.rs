//! Builder pattern for Engine

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::{ClientError, Result};
use crate::library::NativeLibrary;
use crate::loader::{FilesystemLoader, Loader};
use crate::registry::SharedLoader;

/// Builder for Engine
///
/// # Example
///
/// ```rust,ignore
/// use verdict_client::{EngineBuilder, EngineConfig};
///
/// // Library and table directory from VERDICT_* variables
/// let engine = EngineBuilder::from_config(EngineConfig::from_env()?).build()?;
///
/// // Explicit library and in-memory tables
/// let engine = EngineBuilder::new()
///     .with_library(NativeLibrary::open("libverdict_native.so")?)
///     .with_loader(MemoryLoader::new().with_decision("table.json", table_bytes))
///     .build()?;
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    library: Option<NativeLibrary>,
    loader: Option<SharedLoader>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::from_config(EngineConfig::new())
    }

    pub fn from_config(config: EngineConfig) -> Self {
        Self {
            config,
            library: None,
            loader: None,
        }
    }

    /// Use an already opened library instead of `library_path`.
    pub fn with_library(mut self, library: NativeLibrary) -> Self {
        self.library = Some(library);
        self
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.library_path = Some(path.into());
        self
    }

    /// Set the loader; takes precedence over `loader_root`.
    pub fn with_loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Serve tables from files below `root`.
    pub fn with_filesystem_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.loader_root = Some(root.into());
        self
    }

    pub fn cache_loader(mut self, enable: bool) -> Self {
        self.config.cache_loader = enable;
        self
    }

    pub fn build(self) -> Result<Engine> {
        let library = match self.library {
            Some(library) => library,
            None => {
                let path = self.config.library_path.as_ref().ok_or_else(|| {
                    ClientError::Config("no native library configured".to_string())
                })?;
                NativeLibrary::open_with_symbol(path, &self.config.entry_symbol)?
            }
        };

        let loader = self.loader.or_else(|| {
            self.config.loader_root.as_ref().map(|root| -> SharedLoader {
                if self.config.cache_loader {
                    Arc::new(FilesystemLoader::new(root))
                } else {
                    Arc::new(FilesystemLoader::without_cache(root))
                }
            })
        });

        tracing::debug!(
            dynamic = library.is_dynamic(),
            loader = loader.is_some(),
            "building engine"
        );
        match loader {
            Some(loader) => Engine::with_shared_loader(&library, loader),
            None => Engine::new(&library),
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
