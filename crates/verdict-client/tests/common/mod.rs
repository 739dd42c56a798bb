//! Common test utilities for client integration tests

#![allow(dead_code)]

use std::sync::Once;

use tracing_subscriber::EnvFilter;
use verdict_client::{Engine, MemoryLoader, NativeLibrary};

/// `input == 15` yields `{"output": 10}`, anything else `{}`
pub const TABLE: &str = r#"{
  "name": "table",
  "rules": [
    { "when": { "input": 15 }, "then": { "output": 10 } }
  ]
}"#;

/// Delegates to `table.json`
pub const PARENT: &str = r#"{
  "name": "parent",
  "rules": [
    { "when": {}, "decision": "table.json" }
  ]
}"#;

/// Install a test-writer subscriber once per binary; `RUST_LOG` picks the level.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Native core linked into the test binary
pub fn library() -> NativeLibrary {
    init_tracing();
    NativeLibrary::from_api(verdict_native::native_api())
}

/// Loader serving `table.json` and `parent.json`
pub fn fixture_loader() -> MemoryLoader {
    MemoryLoader::new()
        .with_decision("table.json", TABLE)
        .with_decision("parent.json", PARENT)
}

pub fn fixture_engine() -> Engine {
    Engine::with_loader(&library(), fixture_loader()).expect("engine")
}

/// Table whose output echoes one of `count` distinct inputs
pub fn echo_table(count: usize) -> String {
    let rules: Vec<String> = (0..count)
        .map(|i| format!(r#"{{"when":{{"input":{i}}},"then":{{"echo":{i}}}}}"#))
        .collect();
    format!(r#"{{"rules":[{}]}}"#, rules.join(","))
}
