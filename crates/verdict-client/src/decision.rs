//! Decision handle

use std::ptr::NonNull;
use std::sync::Arc;

use serde::Serialize;
use verdict_abi::NativeDecision;

use crate::error::Result;
use crate::library::NativeLibrary;
use crate::marshal;
use crate::registry::CallbackHandle;
use crate::types::{EvaluationOptions, EvaluationResponse};

/// A parsed table owned by the native core
///
/// Independent of the [`Engine`](crate::Engine) that produced it: either
/// may be disposed first. The decision keeps the engine's loader
/// registered, since sub-decisions it references resolve lazily.
pub struct Decision {
    raw: NonNull<NativeDecision>,
    library: NativeLibrary,
    _callback: Option<Arc<CallbackHandle>>,
}

// SAFETY: native decisions are immutable and evaluate reentrantly.
unsafe impl Send for Decision {}
unsafe impl Sync for Decision {}

impl Decision {
    pub(crate) fn from_raw(
        raw: NonNull<NativeDecision>,
        library: NativeLibrary,
        callback: Option<Arc<CallbackHandle>>,
    ) -> Self {
        tracing::debug!("decision created");
        Self {
            raw,
            library,
            _callback: callback,
        }
    }

    pub fn evaluate<C>(&self, context: &C) -> Result<EvaluationResponse>
    where
        C: Serialize + ?Sized,
    {
        self.evaluate_with_opts(context, EvaluationOptions::default())
    }

    pub fn evaluate_with_opts<C>(
        &self,
        context: &C,
        options: EvaluationOptions,
    ) -> Result<EvaluationResponse>
    where
        C: Serialize + ?Sized,
    {
        let api = self.library.api();

        tracing::trace!(
            trace = options.trace,
            max_depth = options.max_depth,
            "decision evaluate"
        );
        marshal::evaluate_with(api, context, options, |context, options| {
            // SAFETY: decision is live; context outlives the call.
            unsafe { (api.decision_evaluate)(self.raw.as_ptr(), context, options) }
        })
    }

    /// Release the native decision.
    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for Decision {
    fn drop(&mut self) {
        // SAFETY: `raw` came from the native core and is freed only here.
        unsafe { (self.library.api().decision_free)(self.raw.as_ptr()) };
        tracing::debug!("decision disposed");
    }
}

impl std::fmt::Debug for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decision").field("raw", &self.raw).finish()
    }
}
