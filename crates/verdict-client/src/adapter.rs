//! Loader adapter
//!
//! Bridges a host [`Loader`](crate::loader::Loader) to the native
//! [`LoaderCallback`](verdict_abi::LoaderCallback) contract: content or
//! error, each a fresh C heap string the native core takes ownership of.
//! Every call allocates independently, so nested resolution re-entering
//! the adapter on the same thread is safe.

use std::ffi::{c_char, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use verdict_abi::LoaderReply;

use crate::registry::CallbackRegistry;

/// Installed as the loader callback of every engine built with a loader.
///
/// # Safety
/// `key` must be null or a NUL-terminated string valid for the call.
pub(crate) unsafe extern "C" fn loader_callback(token: usize, key: *const c_char) -> LoaderReply {
    refill_reserve();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| unsafe { load(token, key) }));

    match outcome {
        Ok(Ok(content)) => match c_heap_string(&content) {
            Some(raw) => LoaderReply::content(raw),
            None => error_reply("loader returned content containing a NUL byte"),
        },
        Ok(Err(message)) => error_reply(&message),
        Err(_) => error_reply("loader panicked"),
    }
}

unsafe fn load(token: usize, key: *const c_char) -> Result<Vec<u8>, String> {
    if key.is_null() {
        return Err("loader called with a null key".to_string());
    }
    let key = CStr::from_ptr(key)
        .to_str()
        .map_err(|_| "loader called with a non UTF-8 key".to_string())?;

    let loader = CallbackRegistry::global().resolve(token).map_err(|e| {
        tracing::warn!(token, key, "loader callback for unregistered token");
        e.to_string()
    })?;

    tracing::trace!(token, key, "loading decision");
    loader.load(key).map_err(|e| {
        tracing::warn!(token, key, error = %e, "loader failed");
        e.to_string()
    })
}

const ALLOCATION_FAILED: &[u8] = b"loader reply allocation failed";

/// Error string set aside for when allocating a reply fails
static RESERVE: AtomicPtr<c_char> = AtomicPtr::new(ptr::null_mut());

fn refill_reserve() {
    if !RESERVE.load(Ordering::Acquire).is_null() {
        return;
    }
    if let Some(raw) = c_heap_string(ALLOCATION_FAILED) {
        if RESERVE
            .compare_exchange(ptr::null_mut(), raw, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // SAFETY: `raw` was never published.
            unsafe { libc::free(raw as *mut libc::c_void) };
        }
    }
}

fn error_reply(message: &str) -> LoaderReply {
    error_reply_with(message, c_heap_string)
}

/// Build an error reply with `alloc`, falling back to the reserved string.
///
/// Only when the reserve is already spent and `alloc` fails are both
/// pointers left null; the core then reports the key as not found.
fn error_reply_with(message: &str, alloc: impl Fn(&[u8]) -> Option<*mut c_char>) -> LoaderReply {
    // Strip NULs so an error string can always be produced.
    let bytes: Vec<u8> = message.bytes().filter(|b| *b != 0).collect();
    if let Some(raw) = alloc(&bytes) {
        return LoaderReply::error(raw);
    }

    tracing::warn!("loader reply allocation failed; using reserved error string");
    let reserve = RESERVE.swap(ptr::null_mut(), Ordering::AcqRel);
    if reserve.is_null() {
        LoaderReply::empty()
    } else {
        LoaderReply::error(reserve)
    }
}

/// Copy `bytes` into a `malloc`'d NUL-terminated string.
///
/// `None` if `bytes` has an interior NUL or allocation fails.
pub(crate) fn c_heap_string(bytes: &[u8]) -> Option<*mut c_char> {
    if bytes.contains(&0) {
        return None;
    }
    let len = bytes.len();

    // SAFETY: the allocation is checked for null and written within `len + 1`.
    unsafe {
        let raw = libc::malloc(len + 1) as *mut u8;
        if raw.is_null() {
            return None;
        }
        ptr::copy_nonoverlapping(bytes.as_ptr(), raw, len);
        *raw.add(len) = 0;
        Some(raw as *mut c_char)
    }
}
