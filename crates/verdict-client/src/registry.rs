//! Callback registry
//!
//! Native code cannot hold Rust closures, so loaders are registered in a
//! process-wide table and the native core is handed an integer token
//! instead. The loader callback turns the token back into the loader.
//!
//! Lookups come from whichever thread the native core happens to call back
//! on, concurrently with registration from host threads; the table is a
//! sharded concurrent map and entries are handed out as `Arc` clones so no
//! shard lock is held while a loader runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::error::{ClientError, Result};
use crate::loader::Loader;

pub type SharedLoader = Arc<dyn Loader>;

/// Token → loader table
pub struct CallbackRegistry {
    entries: DashMap<usize, SharedLoader>,
    next_token: AtomicUsize,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            // 0 is never handed out
            next_token: AtomicUsize::new(1),
        }
    }

    /// Registry consulted by the loader callback
    pub fn global() -> &'static CallbackRegistry {
        static REGISTRY: OnceLock<CallbackRegistry> = OnceLock::new();
        REGISTRY.get_or_init(CallbackRegistry::new)
    }

    /// Store `loader` under a fresh token. Tokens are never reused.
    pub fn register(&self, loader: SharedLoader) -> usize {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(token, loader);
        tracing::trace!(token, "loader registered");
        token
    }

    pub fn resolve(&self, token: usize) -> Result<SharedLoader> {
        self.entries
            .get(&token)
            .map(|entry| entry.value().clone())
            .ok_or(ClientError::InvalidHandle(token))
    }

    /// Remove `token`; returns whether it was present. Idempotent.
    pub fn deregister(&self, token: usize) -> bool {
        let removed = self.entries.remove(&token).is_some();
        if removed {
            tracing::trace!(token, "loader deregistered");
        }
        removed
    }

    pub fn contains(&self, token: usize) -> bool {
        self.entries.contains_key(&token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Owned registration in the global registry; dropping it deregisters the token.
pub struct CallbackHandle {
    token: usize,
}

impl CallbackHandle {
    pub fn register(loader: SharedLoader) -> Self {
        Self {
            token: CallbackRegistry::global().register(loader),
        }
    }

    pub fn token(&self) -> usize {
        self.token
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        CallbackRegistry::global().deregister(self.token);
    }
}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle")
            .field("token", &self.token)
            .finish()
    }
}
