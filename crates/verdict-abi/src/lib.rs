//! Verdict boundary ABI
//!
//! C-compatible types exchanged between a host client and a native
//! rules-evaluation core. Nothing in this crate allocates or frees; it only
//! fixes the shapes both sides agree on.
//!
//! # Ownership
//!
//! Every string crossing the boundary lives on the C heap (`malloc`/`free`).
//! Strings returned by the native core are released by the host through
//! [`NativeApi::string_free`]. Strings returned by the host from a
//! [`LoaderCallback`] are released by the native core. Buffers passed as
//! arguments stay owned by the caller and must not be retained by the callee.

use std::ffi::c_char;
use std::marker::{PhantomData, PhantomPinned};
use std::ptr;

/// Name of the symbol a native core library exports to hand out its [`NativeApi`].
pub const ENTRY_SYMBOL: &str = "verdict_native_api";

/// Opaque native engine. Only ever handled behind a pointer.
#[repr(C)]
pub struct NativeEngine {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// Opaque native decision (a parsed, evaluable table).
#[repr(C)]
pub struct NativeDecision {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// Either a result pointer or an error string, never both.
///
/// Cannot, and should not, be initialized manually outside a native core.
/// Use [`BoundaryResult::ok`] or [`BoundaryResult::error`].
#[repr(C)]
pub struct BoundaryResult<T> {
    pub result: *mut T,
    pub error: *mut c_char,
}

impl<T> BoundaryResult<T> {
    pub fn ok(result: *mut T) -> Self {
        Self {
            result,
            error: ptr::null_mut(),
        }
    }

    pub fn error(error: *mut c_char) -> Self {
        Self {
            result: ptr::null_mut(),
            error,
        }
    }

    /// Exactly one of the two pointers is set.
    pub fn is_well_formed(&self) -> bool {
        self.result.is_null() != self.error.is_null()
    }
}

/// Reply of the host loader callback.
///
/// On success `content` holds the table bytes; on failure `error` holds a
/// description. A reply with both pointers null is read as "key not found".
#[repr(C)]
pub struct LoaderReply {
    pub content: *mut c_char,
    pub error: *mut c_char,
}

impl LoaderReply {
    pub fn content(content: *mut c_char) -> Self {
        Self {
            content,
            error: ptr::null_mut(),
        }
    }

    pub fn error(error: *mut c_char) -> Self {
        Self {
            content: ptr::null_mut(),
            error,
        }
    }

    pub fn empty() -> Self {
        Self {
            content: ptr::null_mut(),
            error: ptr::null_mut(),
        }
    }
}

/// Evaluation options as seen by the native core.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeOptions {
    pub trace: bool,
    pub max_depth: u8,
}

impl Default for NativeOptions {
    fn default() -> Self {
        Self {
            trace: false,
            max_depth: 1,
        }
    }
}

/// Host function the native core calls to resolve a key into table bytes.
///
/// `token` identifies the host-side loader; `key` is borrowed for the
/// duration of the call only.
pub type LoaderCallback = unsafe extern "C" fn(token: usize, key: *const c_char) -> LoaderReply;

/// Function table of a native core.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct NativeApi {
    /// Create an engine. `loader_token` is copied; `loader_callback` is
    /// invoked with it for every key the engine has not seen yet.
    pub engine_new: unsafe extern "C" fn(
        loader_token: Option<&usize>,
        loader_callback: Option<LoaderCallback>,
    ) -> *mut NativeEngine,

    pub engine_free: unsafe extern "C" fn(engine: *mut NativeEngine),

    /// Resolve `key` and evaluate it against a JSON `context`.
    pub engine_evaluate: unsafe extern "C" fn(
        engine: *const NativeEngine,
        key: *const c_char,
        context: *const c_char,
        options: NativeOptions,
    ) -> BoundaryResult<c_char>,

    pub engine_get_decision: unsafe extern "C" fn(
        engine: *const NativeEngine,
        key: *const c_char,
    ) -> BoundaryResult<NativeDecision>,

    /// Parse table JSON directly, bypassing the loader.
    pub engine_create_decision: unsafe extern "C" fn(
        engine: *const NativeEngine,
        content: *const c_char,
    ) -> BoundaryResult<NativeDecision>,

    pub decision_evaluate: unsafe extern "C" fn(
        decision: *const NativeDecision,
        context: *const c_char,
        options: NativeOptions,
    ) -> BoundaryResult<c_char>,

    pub decision_free: unsafe extern "C" fn(decision: *mut NativeDecision),

    /// Release a string returned by any of the functions above.
    pub string_free: unsafe extern "C" fn(string: *mut c_char),
}

/// Signature of the [`ENTRY_SYMBOL`] export.
pub type EntryPoint = unsafe extern "C" fn() -> NativeApi;
