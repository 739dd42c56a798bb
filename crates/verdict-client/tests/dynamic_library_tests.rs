//! Native core opened as a shared library

mod common;

use std::path::PathBuf;

use anyhow::Result;
use common::{fixture_loader, init_tracing};
use serde_json::json;
use verdict_client::{ClientError, Engine, EngineBuilder, NativeLibrary, ENTRY_SYMBOL};

/// The `verdict-native` cdylib built next to this test binary.
fn native_library_path() -> PathBuf {
    let file_name = libloading::library_filename("verdict_native");
    let exe = std::env::current_exe().expect("test binary path");
    let deps = exe.parent().expect("deps directory");

    [deps, deps.parent().unwrap_or(deps)]
        .iter()
        .map(|dir| dir.join(&file_name))
        .find(|path| path.exists())
        .unwrap_or_else(|| panic!("{:?} not built under {}", file_name, deps.display()))
}

#[test]
fn test_open_resolves_entry_symbol() -> Result<()> {
    init_tracing();
    let library = NativeLibrary::open(native_library_path())?;
    assert!(library.is_dynamic());

    let engine = Engine::with_loader(&library, fixture_loader())?;
    let response = engine.evaluate("table.json", &json!({"input": 15}))?;
    assert_eq!(response.result, json!({"output": 10}));

    let err = engine.get_decision("missing.json").unwrap_err();
    assert!(matches!(&err, ClientError::DecisionLoad(m) if m == "decision not found: missing.json"));
    Ok(())
}

#[test]
fn test_decision_keeps_library_mapped() -> Result<()> {
    init_tracing();
    let library = NativeLibrary::open_with_symbol(native_library_path(), ENTRY_SYMBOL)?;
    let engine = Engine::with_loader(&library, fixture_loader())?;
    let decision = engine.get_decision("table.json")?;

    drop(library);
    engine.dispose();

    let response = decision.evaluate(&json!({"input": 15}))?;
    assert_eq!(response.result, json!({"output": 10}));
    decision.dispose();
    Ok(())
}

#[test]
fn test_builder_opens_library_path() -> Result<()> {
    init_tracing();
    let engine = EngineBuilder::new()
        .with_library_path(native_library_path())
        .with_loader(fixture_loader())
        .build()?;

    let response = engine.evaluate("table.json", &json!({"input": 15}))?;
    assert_eq!(response.result, json!({"output": 10}));
    Ok(())
}

#[test]
fn test_unknown_entry_symbol() {
    let err = NativeLibrary::open_with_symbol(native_library_path(), "verdict_no_such_symbol")
        .unwrap_err();
    assert!(matches!(&err, ClientError::Library(m) if m.contains("verdict_no_such_symbol")));
}
