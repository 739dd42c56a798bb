//! Configuration types for Engine

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use verdict_abi::ENTRY_SYMBOL;

use crate::error::{ClientError, Result};

pub const ENV_LIBRARY_PATH: &str = "VERDICT_LIBRARY_PATH";
pub const ENV_ENTRY_SYMBOL: &str = "VERDICT_ENTRY_SYMBOL";
pub const ENV_LOADER_ROOT: &str = "VERDICT_LOADER_ROOT";
pub const ENV_LOADER_CACHE: &str = "VERDICT_LOADER_CACHE";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Shared library exporting the native core
    pub library_path: Option<PathBuf>,

    /// Symbol returning the native function table
    #[serde(default = "default_entry_symbol")]
    pub entry_symbol: String,

    /// Directory served by a `FilesystemLoader`
    pub loader_root: Option<PathBuf>,

    /// Cache table contents read from `loader_root`
    #[serde(default = "default_cache_loader")]
    pub cache_loader: bool,
}

fn default_entry_symbol() -> String {
    ENTRY_SYMBOL.to_string()
}

fn default_cache_loader() -> bool {
    true
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            library_path: None,
            entry_symbol: default_entry_symbol(),
            loader_root: None,
            cache_loader: default_cache_loader(),
        }
    }

    /// Read `VERDICT_*` environment variables; unset ones keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::new();

        if let Some(path) = lookup(ENV_LIBRARY_PATH) {
            config.library_path = Some(PathBuf::from(path));
        }
        if let Some(symbol) = lookup(ENV_ENTRY_SYMBOL) {
            config.entry_symbol = symbol;
        }
        if let Some(root) = lookup(ENV_LOADER_ROOT) {
            config.loader_root = Some(PathBuf::from(root));
        }
        if let Some(cache) = lookup(ENV_LOADER_CACHE) {
            config.cache_loader = parse_bool(&cache).ok_or_else(|| {
                ClientError::Config(format!("{} must be a boolean, got '{}'", ENV_LOADER_CACHE, cache))
            })?;
        }

        Ok(config)
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    pub fn with_entry_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.entry_symbol = symbol.into();
        self
    }

    pub fn with_loader_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.loader_root = Some(root.into());
        self
    }

    pub fn cache_loader(mut self, enable: bool) -> Self {
        self.cache_loader = enable;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
