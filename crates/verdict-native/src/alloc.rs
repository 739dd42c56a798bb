//! Boundary allocations
//!
//! Strings handed across the boundary live on the C heap. Everything the
//! core allocates is counted so tests can assert that the host released it,
//! and every loader string the host hands over is counted until the core
//! frees it.

use std::ffi::{c_char, CStr};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use verdict_abi::LoaderReply;

static LIVE_STRINGS: AtomicUsize = AtomicUsize::new(0);
static LIVE_ENGINES: AtomicUsize = AtomicUsize::new(0);
static LIVE_DECISIONS: AtomicUsize = AtomicUsize::new(0);
static LIVE_HOST_STRINGS: AtomicUsize = AtomicUsize::new(0);

/// Snapshot of boundary allocations not yet released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocationStats {
    /// Core strings the host has not freed
    pub strings: usize,
    pub engines: usize,
    pub decisions: usize,
    /// Loader reply strings received from the host and not yet freed
    pub host_strings: usize,
}

impl AllocationStats {
    pub fn total(&self) -> usize {
        self.strings + self.engines + self.decisions + self.host_strings
    }
}

pub fn allocation_stats() -> AllocationStats {
    AllocationStats {
        strings: LIVE_STRINGS.load(Ordering::SeqCst),
        engines: LIVE_ENGINES.load(Ordering::SeqCst),
        decisions: LIVE_DECISIONS.load(Ordering::SeqCst),
        host_strings: LIVE_HOST_STRINGS.load(Ordering::SeqCst),
    }
}

/// Copy `bytes` into a NUL-terminated C heap string owned by the caller.
///
/// Interior NUL bytes are dropped. Returns null if `malloc` fails.
pub(crate) fn alloc_string(bytes: &[u8]) -> *mut c_char {
    let bytes: Vec<u8> = bytes.iter().copied().filter(|b| *b != 0).collect();
    let len = bytes.len();

    // SAFETY: malloc with a non-zero size; the result is checked for null
    // and written within its `len + 1` bounds.
    unsafe {
        let raw = libc::malloc(len + 1) as *mut u8;
        if raw.is_null() {
            return ptr::null_mut();
        }
        ptr::copy_nonoverlapping(bytes.as_ptr(), raw, len);
        *raw.add(len) = 0;

        LIVE_STRINGS.fetch_add(1, Ordering::SeqCst);
        raw as *mut c_char
    }
}

/// Release a string previously returned by [`alloc_string`].
///
/// # Safety
/// `string` must be null or a pointer from [`alloc_string`] not yet freed.
pub(crate) unsafe fn free_string(string: *mut c_char) {
    if string.is_null() {
        return;
    }
    libc::free(string as *mut libc::c_void);
    LIVE_STRINGS.fetch_sub(1, Ordering::SeqCst);
}

/// Take ownership of both strings of a loader reply, releasing them.
///
/// Returns `(content, error)`.
///
/// # Safety
/// Each pointer must be null or a NUL-terminated `malloc` allocation that
/// the host handed over and no longer touches.
pub(crate) unsafe fn take_loader_reply(reply: LoaderReply) -> (Option<Vec<u8>>, Option<Vec<u8>>) {
    for string in [reply.content, reply.error] {
        if !string.is_null() {
            LIVE_HOST_STRINGS.fetch_add(1, Ordering::SeqCst);
        }
    }
    (take_host_string(reply.content), take_host_string(reply.error))
}

/// Copy out and release a string the host allocated for us.
///
/// # Safety
/// `string` must be null or a NUL-terminated `malloc` allocation that the
/// host handed over and no longer touches.
unsafe fn take_host_string(string: *mut c_char) -> Option<Vec<u8>> {
    if string.is_null() {
        return None;
    }
    let bytes = CStr::from_ptr(string).to_bytes().to_vec();
    libc::free(string as *mut libc::c_void);
    LIVE_HOST_STRINGS.fetch_sub(1, Ordering::SeqCst);
    Some(bytes)
}

pub(crate) fn engine_created() {
    LIVE_ENGINES.fetch_add(1, Ordering::SeqCst);
}

pub(crate) fn engine_released() {
    LIVE_ENGINES.fetch_sub(1, Ordering::SeqCst);
}

pub(crate) fn decision_created() {
    LIVE_DECISIONS.fetch_add(1, Ordering::SeqCst);
}

pub(crate) fn decision_released() {
    LIVE_DECISIONS.fetch_sub(1, Ordering::SeqCst);
}
