//! Native core library
//!
//! A native core is reached through its [`NativeApi`] function table. The
//! table either comes from a core linked into the process or is resolved
//! from a shared library at runtime with `libloading`. Every engine and
//! decision holds a clone of the [`NativeLibrary`], so a dynamically loaded
//! core stays mapped while any handle into it is alive.

use std::path::Path;
use std::sync::Arc;

use libloading::{Library, Symbol};
use verdict_abi::{EntryPoint, NativeApi, ENTRY_SYMBOL};

use crate::error::{ClientError, Result};

#[derive(Clone)]
pub struct NativeLibrary {
    api: NativeApi,
    library: Option<Arc<Library>>,
}

impl NativeLibrary {
    /// Use a function table from a core linked into this process.
    pub fn from_api(api: NativeApi) -> Self {
        Self {
            api,
            library: None,
        }
    }

    /// Open a shared library and resolve the default entry symbol.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_symbol(path, ENTRY_SYMBOL)
    }

    pub fn open_with_symbol(path: impl AsRef<Path>, symbol: &str) -> Result<Self> {
        let path = path.as_ref();

        // SAFETY: loading a library runs its initializers; the caller vouches
        // for the library at `path`.
        let library = unsafe { Library::new(path) }.map_err(|e| {
            ClientError::Library(format!(
                "failed to load library '{}': {}",
                path.display(),
                e
            ))
        })?;

        // SAFETY: the entry symbol is declared with the `EntryPoint` signature.
        let api = unsafe {
            let entry: Symbol<EntryPoint> = library.get(symbol.as_bytes()).map_err(|e| {
                ClientError::Library(format!(
                    "symbol '{}' not found in library '{}': {}",
                    symbol,
                    path.display(),
                    e
                ))
            })?;
            entry()
        };

        tracing::debug!(path = %path.display(), symbol, "native library loaded");
        Ok(Self {
            api,
            library: Some(Arc::new(library)),
        })
    }

    pub(crate) fn api(&self) -> &NativeApi {
        &self.api
    }

    pub fn is_dynamic(&self) -> bool {
        self.library.is_some()
    }
}

impl std::fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("dynamic", &self.is_dynamic())
            .finish()
    }
}
