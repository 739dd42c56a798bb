//! Verdict reference native core
//!
//! A small rules core exposing the verdict boundary ABI. It resolves tables
//! through the host loader callback, evaluates them, and hands results back
//! as C heap strings. Used to exercise the client end to end; the rule
//! semantics are intentionally minimal.

use std::any::Any;
use std::ffi::{c_char, CStr};
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use serde_json::Value;
use verdict_abi::{
    BoundaryResult, LoaderCallback, NativeApi, NativeDecision, NativeEngine, NativeOptions,
};

mod alloc;
mod engine;
mod table;

pub use alloc::{allocation_stats, AllocationStats};

use crate::alloc::{alloc_string, free_string};
use crate::engine::{DecisionState, EngineState, LoaderLink};

/// Function table for hosts linking this core statically.
pub fn native_api() -> NativeApi {
    NativeApi {
        engine_new: verdict_engine_new,
        engine_free: verdict_engine_free,
        engine_evaluate: verdict_engine_evaluate,
        engine_get_decision: verdict_engine_get_decision,
        engine_create_decision: verdict_engine_create_decision,
        decision_evaluate: verdict_decision_evaluate,
        decision_free: verdict_decision_free,
        string_free: verdict_string_free,
    }
}

/// Entry point resolved by hosts loading this core as a shared library
#[no_mangle]
pub extern "C" fn verdict_native_api() -> NativeApi {
    native_api()
}

/// Initialize the logging system
#[no_mangle]
pub extern "C" fn verdict_init_logging() {
    let _ = env_logger::try_init();
}

fn error_result<T>(message: impl Display) -> BoundaryResult<T> {
    BoundaryResult::error(alloc_string(message.to_string().as_bytes()))
}

fn json_result(value: &Value) -> BoundaryResult<c_char> {
    match serde_json::to_vec(value) {
        Ok(bytes) => BoundaryResult::ok(alloc_string(&bytes)),
        Err(e) => error_result(format!("JSON_SERIALIZE: {}", e)),
    }
}

fn decision_result(decision: DecisionState) -> BoundaryResult<NativeDecision> {
    alloc::decision_created();
    BoundaryResult::ok(Box::into_raw(Box::new(decision)) as *mut NativeDecision)
}

/// # Safety
/// `ptr` must be null or a valid NUL-terminated string for the duration of the call.
unsafe fn borrow_str<'a>(ptr: *const c_char, name: &str) -> Result<&'a str, String> {
    if ptr.is_null() {
        return Err(format!("PTR_NULL: {}", name));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| format!("INVALID_STR: {}", name))
}

unsafe fn parse_context(ptr: *const c_char) -> Result<Value, String> {
    let text = borrow_str(ptr, "context")?;
    serde_json::from_str(text).map_err(|e| format!("JSON_PARSE: context {}", e))
}

/// Run an export body, turning a panic into an error reply.
fn guarded<T>(call: &str, body: impl FnOnce() -> BoundaryResult<T>) -> BoundaryResult<T> {
    panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        log::error!("panic in {}: {}", call, message);
        error_result(format!("PANIC: {}: {}", call, message))
    })
}

/// Run a body with no reply channel; a panic is logged and swallowed.
fn guarded_unit(call: &str, body: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(body)) {
        log::error!("panic in {}: {}", call, panic_message(payload.as_ref()));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Create an engine; free it with `verdict_engine_free`.
///
/// Returns null if construction panics.
///
/// # Safety
/// `loader_token` must be null or point to a readable `usize`.
#[no_mangle]
pub unsafe extern "C" fn verdict_engine_new(
    loader_token: Option<&usize>,
    loader_callback: Option<LoaderCallback>,
) -> *mut NativeEngine {
    let created = panic::catch_unwind(|| {
        let loader = match (loader_token, loader_callback) {
            (Some(token), Some(callback)) => Some(LoaderLink::new(*token, callback)),
            _ => None,
        };
        log::debug!("engine created (loader: {})", loader.is_some());
        Box::new(EngineState::new(loader))
    });

    match created {
        Ok(engine) => {
            alloc::engine_created();
            Box::into_raw(engine) as *mut NativeEngine
        }
        Err(payload) => {
            log::error!("panic in engine_new: {}", panic_message(payload.as_ref()));
            ptr::null_mut()
        }
    }
}

/// # Safety
/// `engine` must be null or a pointer from `verdict_engine_new` not yet freed.
#[no_mangle]
pub unsafe extern "C" fn verdict_engine_free(engine: *mut NativeEngine) {
    if engine.is_null() {
        return;
    }
    guarded_unit("engine_free", || {
        drop(Box::from_raw(engine as *mut EngineState));
    });
    alloc::engine_released();
}

/// # Safety
/// `engine` must be a live engine; `key` and `context` valid C strings.
#[no_mangle]
pub unsafe extern "C" fn verdict_engine_evaluate(
    engine: *const NativeEngine,
    key: *const c_char,
    context: *const c_char,
    options: NativeOptions,
) -> BoundaryResult<c_char> {
    if engine.is_null() {
        return error_result("PTR_NULL: engine");
    }
    guarded("engine_evaluate", || {
        let key = match borrow_str(key, "key") {
            Ok(k) => k,
            Err(e) => return error_result(e),
        };
        let context = match parse_context(context) {
            Ok(c) => c,
            Err(e) => return error_result(e),
        };

        let engine = &*(engine as *const EngineState);
        match engine.evaluate(key, &context, options) {
            Ok(envelope) => json_result(&envelope),
            Err(e) => error_result(e),
        }
    })
}

/// # Safety
/// `engine` must be a live engine; `key` a valid C string.
#[no_mangle]
pub unsafe extern "C" fn verdict_engine_get_decision(
    engine: *const NativeEngine,
    key: *const c_char,
) -> BoundaryResult<NativeDecision> {
    if engine.is_null() {
        return error_result("PTR_NULL: engine");
    }
    guarded("engine_get_decision", || {
        let key = match borrow_str(key, "key") {
            Ok(k) => k,
            Err(e) => return error_result(e),
        };

        let engine = &*(engine as *const EngineState);
        match engine.get_decision(key) {
            Ok(decision) => decision_result(decision),
            Err(e) => error_result(e),
        }
    })
}

/// # Safety
/// `engine` must be a live engine; `content` a valid C string.
#[no_mangle]
pub unsafe extern "C" fn verdict_engine_create_decision(
    engine: *const NativeEngine,
    content: *const c_char,
) -> BoundaryResult<NativeDecision> {
    if engine.is_null() {
        return error_result("PTR_NULL: engine");
    }
    if content.is_null() {
        return error_result("PTR_NULL: content");
    }
    guarded("engine_create_decision", || {
        let engine = &*(engine as *const EngineState);
        let content = CStr::from_ptr(content).to_bytes();
        match engine.create_decision(content) {
            Ok(decision) => decision_result(decision),
            Err(e) => error_result(e),
        }
    })
}

/// # Safety
/// `decision` must be a live decision; `context` a valid C string.
#[no_mangle]
pub unsafe extern "C" fn verdict_decision_evaluate(
    decision: *const NativeDecision,
    context: *const c_char,
    options: NativeOptions,
) -> BoundaryResult<c_char> {
    if decision.is_null() {
        return error_result("PTR_NULL: decision");
    }
    guarded("decision_evaluate", || {
        let context = match parse_context(context) {
            Ok(c) => c,
            Err(e) => return error_result(e),
        };

        let decision = &*(decision as *const DecisionState);
        match decision.evaluate(&context, options) {
            Ok(envelope) => json_result(&envelope),
            Err(e) => error_result(e),
        }
    })
}

/// # Safety
/// `decision` must be null or a pointer from this core not yet freed.
#[no_mangle]
pub unsafe extern "C" fn verdict_decision_free(decision: *mut NativeDecision) {
    if decision.is_null() {
        return;
    }
    guarded_unit("decision_free", || {
        drop(Box::from_raw(decision as *mut DecisionState));
    });
    alloc::decision_released();
}

/// Free a string returned by this core
///
/// # Safety
/// `string` must be null or a string returned by this core not yet freed.
#[no_mangle]
pub unsafe extern "C" fn verdict_string_free(string: *mut c_char) {
    free_string(string);
}
