//! Marshaling protocol
//!
//! Requests go out as caller-owned C strings that live until the native
//! call returns. Replies come back as native-owned strings which are
//! wrapped in [`NativeString`] before anything else happens, so each one is
//! released exactly once whichever path the decode takes.

use std::ffi::{c_char, CStr, CString};
use std::ptr::NonNull;

use serde::Serialize;
use verdict_abi::{BoundaryResult, NativeApi, NativeDecision, NativeOptions};

use crate::error::{ClientError, Result};
use crate::types::{EvaluationOptions, EvaluationResponse};

/// Native-owned string, released through `string_free` on drop
pub(crate) struct NativeString {
    raw: NonNull<c_char>,
    free: unsafe extern "C" fn(*mut c_char),
}

impl NativeString {
    /// # Safety
    /// `raw` must be null or a NUL-terminated string allocated by the core
    /// behind `api` and not owned by anything else.
    pub(crate) unsafe fn from_raw(raw: *mut c_char, api: &NativeApi) -> Option<Self> {
        NonNull::new(raw).map(|raw| Self {
            raw,
            free: api.string_free,
        })
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        // SAFETY: valid and NUL-terminated until drop.
        unsafe { CStr::from_ptr(self.raw.as_ptr()) }.to_bytes()
    }

    pub(crate) fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

impl Drop for NativeString {
    fn drop(&mut self) {
        // SAFETY: owned exclusively since `from_raw`.
        unsafe { (self.free)(self.raw.as_ptr()) }
    }
}

pub(crate) fn encode_key(key: &str) -> Result<CString> {
    CString::new(key).map_err(|_| ClientError::Encoding(format!("key {:?} contains a NUL byte", key)))
}

/// Serialize the evaluation context to JSON.
pub(crate) fn encode_context<C: Serialize + ?Sized>(context: &C) -> Result<CString> {
    let bytes = serde_json::to_vec(context).map_err(|e| ClientError::Encoding(e.to_string()))?;
    CString::new(bytes).map_err(|_| ClientError::Encoding("context contains a NUL byte".to_string()))
}

/// Raw table bytes for `create_decision`; malformed input is a load failure.
pub(crate) fn encode_table(content: &[u8]) -> Result<CString> {
    CString::new(content)
        .map_err(|_| ClientError::DecisionLoad("table content contains a NUL byte".to_string()))
}

/// Encode `context`, run `call`, decode its reply.
pub(crate) fn evaluate_with<C, F>(
    api: &NativeApi,
    context: &C,
    options: EvaluationOptions,
    call: F,
) -> Result<EvaluationResponse>
where
    C: Serialize + ?Sized,
    F: FnOnce(*const c_char, NativeOptions) -> BoundaryResult<c_char>,
{
    let context = encode_context(context)?;
    let reply = call(context.as_ptr(), options.into());
    // SAFETY: `reply` comes straight from the core behind `api`.
    unsafe { take_evaluation(api, reply) }
}

/// Decode an evaluation reply and release its buffers.
///
/// # Safety
/// Both pointers of `reply` must be null or owned strings of the core behind `api`.
pub(crate) unsafe fn take_evaluation(
    api: &NativeApi,
    reply: BoundaryResult<c_char>,
) -> Result<EvaluationResponse> {
    let result = NativeString::from_raw(reply.result, api);
    let error = NativeString::from_raw(reply.error, api);

    if let Some(error) = error {
        return Err(ClientError::Evaluation(error.to_string_lossy()));
    }
    let Some(result) = result else {
        return Err(ClientError::Decoding(
            "native core returned neither a result nor an error".to_string(),
        ));
    };

    serde_json::from_slice(result.as_bytes()).map_err(|e| ClientError::Decoding(e.to_string()))
}

/// Take ownership of a decision reply.
///
/// # Safety
/// `reply.error` must be null or an owned string of the core behind `api`;
/// `reply.result` null or a decision it allocated.
pub(crate) unsafe fn take_decision(
    api: &NativeApi,
    reply: BoundaryResult<NativeDecision>,
) -> Result<NonNull<NativeDecision>> {
    let error = NativeString::from_raw(reply.error, api);

    match (NonNull::new(reply.result), error) {
        (Some(decision), None) => Ok(decision),
        (decision, Some(error)) => {
            if let Some(decision) = decision {
                (api.decision_free)(decision.as_ptr());
            }
            Err(ClientError::DecisionLoad(error.to_string_lossy()))
        }
        (None, None) => Err(ClientError::DecisionLoad(
            "native core returned neither a decision nor an error".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::c_heap_string;
    use serde_json::json;
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::ptr;

    thread_local! {
        static FREED: Cell<usize> = const { Cell::new(0) };
    }

    unsafe extern "C" fn counting_free(string: *mut c_char) {
        if !string.is_null() {
            libc::free(string as *mut libc::c_void);
            FREED.with(|freed| freed.set(freed.get() + 1));
        }
    }

    fn api() -> NativeApi {
        NativeApi {
            string_free: counting_free,
            ..verdict_native::native_api()
        }
    }

    fn freed() -> usize {
        FREED.with(Cell::get)
    }

    fn string(text: &str) -> *mut c_char {
        c_heap_string(text.as_bytes()).unwrap()
    }

    #[test]
    fn test_decodes_result_and_frees_it() {
        let reply = BoundaryResult::ok(string(r#"{"performance":"1µs","result":{"output":10}}"#));
        let response = unsafe { take_evaluation(&api(), reply) }.unwrap();

        assert_eq!(response.result, json!({"output": 10}));
        assert_eq!(response.performance, "1µs");
        assert!(response.trace.is_none());
        assert_eq!(freed(), 1);
    }

    #[test]
    fn test_error_is_passed_through_and_freed() {
        let reply: BoundaryResult<c_char> = BoundaryResult::error(string("DEPTH_LIMIT: nope"));
        let err = unsafe { take_evaluation(&api(), reply) }.unwrap_err();

        assert!(matches!(&err, ClientError::Evaluation(m) if m == "DEPTH_LIMIT: nope"));
        assert_eq!(freed(), 1);
    }

    #[test]
    fn test_malformed_result_still_freed() {
        let reply = BoundaryResult::ok(string("not json"));
        let err = unsafe { take_evaluation(&api(), reply) }.unwrap_err();

        assert!(matches!(err, ClientError::Decoding(_)));
        assert_eq!(freed(), 1);
    }

    #[test]
    fn test_both_pointers_set_frees_both() {
        let reply = BoundaryResult {
            result: string("{}"),
            error: string("boom"),
        };
        let err = unsafe { take_evaluation(&api(), reply) }.unwrap_err();

        assert!(matches!(err, ClientError::Evaluation(_)));
        assert_eq!(freed(), 2);
    }

    #[test]
    fn test_empty_reply() {
        let reply: BoundaryResult<c_char> = BoundaryResult::ok(ptr::null_mut());
        let err = unsafe { take_evaluation(&api(), reply) }.unwrap_err();

        assert!(matches!(err, ClientError::Decoding(_)));
        assert_eq!(freed(), 0);
    }

    #[test]
    fn test_decision_error_reply() {
        let reply: BoundaryResult<NativeDecision> = BoundaryResult::error(string("JSON_PARSE: bad"));
        let err = unsafe { take_decision(&api(), reply) }.unwrap_err();

        assert!(matches!(&err, ClientError::DecisionLoad(m) if m == "JSON_PARSE: bad"));
        assert_eq!(freed(), 1);

        let empty: BoundaryResult<NativeDecision> = BoundaryResult::ok(ptr::null_mut());
        assert!(matches!(
            unsafe { take_decision(&api(), empty) },
            Err(ClientError::DecisionLoad(_))
        ));
    }

    #[test]
    fn test_encode_context() {
        let encoded = encode_context(&json!({"input": 15})).unwrap();
        assert_eq!(encoded.to_str().unwrap(), r#"{"input":15}"#);

        let mut unserializable = HashMap::new();
        unserializable.insert(vec![1u8], 1);
        assert!(matches!(
            encode_context(&unserializable),
            Err(ClientError::Encoding(_))
        ));
    }

    #[test]
    fn test_encode_key_and_table() {
        assert!(encode_key("table.json").is_ok());
        assert!(matches!(encode_key("a\0b"), Err(ClientError::Encoding(_))));
        assert!(matches!(
            encode_table(b"{\0}"),
            Err(ClientError::DecisionLoad(_))
        ));
    }
}
