//! Engine handle
//!
//! An [`Engine`] owns one native engine. It evaluates keys resolved through
//! its loader, hands out [`Decision`] handles and frees the native engine
//! exactly once, on [`Engine::dispose`] or drop.

use std::ptr::NonNull;
use std::sync::Arc;

use serde::Serialize;
use verdict_abi::{LoaderCallback, NativeDecision, NativeEngine};

use crate::adapter;
use crate::builder::EngineBuilder;
use crate::decision::Decision;
use crate::error::{ClientError, Result};
use crate::library::NativeLibrary;
use crate::loader::Loader;
use crate::marshal;
use crate::registry::{CallbackHandle, SharedLoader};
use crate::types::{EvaluationOptions, EvaluationResponse};

/// Host handle to a native engine
///
/// # Example
///
/// ```rust,ignore
/// use serde_json::json;
/// use verdict_client::{Engine, MemoryLoader, NativeLibrary};
///
/// let library = NativeLibrary::open("libverdict_native.so")?;
/// let loader = MemoryLoader::new().with_decision("table.json", table_bytes);
/// let engine = Engine::with_loader(&library, loader)?;
///
/// let response = engine.evaluate("table.json", &json!({"input": 15}))?;
/// assert_eq!(response.result["output"], 10);
/// engine.dispose();
/// ```
pub struct Engine {
    raw: NonNull<NativeEngine>,
    library: NativeLibrary,
    callback: Option<Arc<CallbackHandle>>,
}

// SAFETY: the native engine supports concurrent evaluation and every field
// is immutable after construction.
unsafe impl Send for Engine {}
unsafe impl Sync for Engine {}

impl Engine {
    /// Engine without a loader; only `create_decision` can produce tables.
    pub fn new(library: &NativeLibrary) -> Result<Self> {
        Self::create(library, None)
    }

    /// Engine that resolves keys through `loader`.
    pub fn with_loader(library: &NativeLibrary, loader: impl Loader + 'static) -> Result<Self> {
        Self::with_shared_loader(library, Arc::new(loader))
    }

    pub(crate) fn with_shared_loader(library: &NativeLibrary, loader: SharedLoader) -> Result<Self> {
        let handle = CallbackHandle::register(loader);
        Self::create(library, Some(Arc::new(handle)))
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    fn create(library: &NativeLibrary, callback: Option<Arc<CallbackHandle>>) -> Result<Self> {
        let api = library.api();
        let token = callback.as_ref().map(|handle| handle.token());
        let loader_callback: Option<LoaderCallback> =
            token.map(|_| adapter::loader_callback as LoaderCallback);

        // SAFETY: the token is copied by the callee before it returns.
        let raw = unsafe { (api.engine_new)(token.as_ref(), loader_callback) };
        let raw = NonNull::new(raw).ok_or_else(|| {
            ClientError::Library("native core failed to create an engine".to_string())
        })?;

        tracing::debug!(loader_token = ?token, "engine created");
        Ok(Self {
            raw,
            library: library.clone(),
            callback,
        })
    }

    /// Evaluate the table at `key` with default options.
    pub fn evaluate<C>(&self, key: &str, context: &C) -> Result<EvaluationResponse>
    where
        C: Serialize + ?Sized,
    {
        self.evaluate_with_opts(key, context, EvaluationOptions::default())
    }

    pub fn evaluate_with_opts<C>(
        &self,
        key: &str,
        context: &C,
        options: EvaluationOptions,
    ) -> Result<EvaluationResponse>
    where
        C: Serialize + ?Sized,
    {
        let api = self.library.api();
        let encoded = marshal::encode_key(key)?;

        tracing::trace!(
            key,
            trace = options.trace,
            max_depth = options.max_depth,
            "engine evaluate"
        );
        marshal::evaluate_with(api, context, options, |context, options| {
            // SAFETY: engine is live; key and context outlive the call.
            unsafe { (api.engine_evaluate)(self.raw.as_ptr(), encoded.as_ptr(), context, options) }
        })
    }

    /// Resolve `key` through the loader into a standalone decision.
    pub fn get_decision(&self, key: &str) -> Result<Decision> {
        let api = self.library.api();
        let encoded = marshal::encode_key(key)?;

        tracing::trace!(key, "engine get_decision");
        // SAFETY: engine is live; key outlives the call.
        let reply = unsafe { (api.engine_get_decision)(self.raw.as_ptr(), encoded.as_ptr()) };
        // SAFETY: the reply comes straight from this engine's core.
        let raw = unsafe { marshal::take_decision(api, reply) }?;
        Ok(self.adopt(raw))
    }

    /// Parse raw table bytes into a decision, bypassing the loader.
    pub fn create_decision(&self, content: &[u8]) -> Result<Decision> {
        let api = self.library.api();
        let content = marshal::encode_table(content)?;

        tracing::trace!(len = content.as_bytes().len(), "engine create_decision");
        // SAFETY: engine is live; content outlives the call.
        let reply = unsafe { (api.engine_create_decision)(self.raw.as_ptr(), content.as_ptr()) };
        // SAFETY: the reply comes straight from this engine's core.
        let raw = unsafe { marshal::take_decision(api, reply) }?;
        Ok(self.adopt(raw))
    }

    fn adopt(&self, raw: NonNull<NativeDecision>) -> Decision {
        Decision::from_raw(raw, self.library.clone(), self.callback.clone())
    }

    /// Release the native engine. Decisions already handed out stay usable.
    pub fn dispose(self) {
        drop(self);
    }

    pub fn has_loader(&self) -> bool {
        self.callback.is_some()
    }

    /// Registry token of this engine's loader
    pub fn loader_token(&self) -> Option<usize> {
        self.callback.as_ref().map(|handle| handle.token())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // SAFETY: `raw` was returned by `engine_new` and is freed only here.
        unsafe { (self.library.api().engine_free)(self.raw.as_ptr()) };
        tracing::debug!(loader_token = ?self.loader_token(), "engine disposed");
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("raw", &self.raw)
            .field("loader_token", &self.loader_token())
            .finish()
    }
}
