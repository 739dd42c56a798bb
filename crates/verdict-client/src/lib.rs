//! Verdict client
//!
//! Host-side handles for a native rules-evaluation core reached through a
//! C-compatible function table. Engines pull table bytes lazily from a
//! host [`Loader`]; requests and results cross the boundary as JSON.

pub mod builder;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod library;
pub mod loader;
pub mod registry;
pub mod types;

mod adapter;
mod marshal;

// Re-export main types
pub use builder::EngineBuilder;
pub use config::EngineConfig;
pub use decision::Decision;
pub use engine::Engine;
pub use error::{ClientError, Result};
pub use library::NativeLibrary;
pub use loader::{FilesystemLoader, Loader, LoaderError, MemoryLoader};
pub use registry::{CallbackHandle, CallbackRegistry};
pub use types::{EvaluationOptions, EvaluationResponse};

// Re-export boundary types hosts may need
pub use verdict_abi::{NativeApi, ENTRY_SYMBOL};
