//! Engine and decision state behind the opaque boundary pointers

use std::collections::HashMap;
use std::ffi::CString;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{anyhow, Result};
use serde_json::Value;
use verdict_abi::{LoaderCallback, NativeOptions};

use crate::alloc::take_loader_reply;
use crate::table::{self, Table, TableSource};

/// Host loader reached through the callback token
pub(crate) struct LoaderLink {
    token: usize,
    callback: LoaderCallback,
}

impl LoaderLink {
    pub(crate) fn new(token: usize, callback: LoaderCallback) -> Self {
        Self { token, callback }
    }

    fn load(&self, key: &str) -> Result<Vec<u8>> {
        let c_key = CString::new(key).map_err(|_| anyhow!("INVALID_KEY: {:?}", key))?;

        log::trace!("loader callback token={} key={}", self.token, key);
        // SAFETY: the host guarantees the token stays registered while the
        // engine lives; `c_key` outlives the call.
        let reply = unsafe { (self.callback)(self.token, c_key.as_ptr()) };

        // Take ownership of both strings before looking at either.
        let (content, error) = unsafe { take_loader_reply(reply) };

        if let Some(error) = error {
            return Err(anyhow!(String::from_utf8_lossy(&error).into_owned()));
        }

        content.ok_or_else(|| anyhow!("decision not found: {}", key))
    }
}

/// Table cache shared by an engine and every decision it produced
pub(crate) struct Resolver {
    loader: Option<LoaderLink>,
    tables: RwLock<HashMap<String, Arc<Table>>>,
}

impl TableSource for Resolver {
    fn table(&self, key: &str) -> Result<Arc<Table>> {
        if let Some(table) = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Ok(table.clone());
        }

        // The lock is released here: the loader may re-enter this resolver.
        let Some(loader) = &self.loader else {
            return Err(anyhow!("decision not found: {}", key));
        };
        let content = loader.load(key)?;
        let table = Arc::new(Table::parse(&content)?);

        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.entry(key.to_string()).or_insert(table).clone())
    }
}

pub(crate) struct EngineState {
    resolver: Arc<Resolver>,
}

impl EngineState {
    pub(crate) fn new(loader: Option<LoaderLink>) -> Self {
        Self {
            resolver: Arc::new(Resolver {
                loader,
                tables: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub(crate) fn evaluate(&self, key: &str, context: &Value, options: NativeOptions) -> Result<Value> {
        let table = self.resolver.table(key)?;
        table::evaluate(key, &table, context, self.resolver.as_ref(), options)
    }

    pub(crate) fn get_decision(&self, key: &str) -> Result<DecisionState> {
        let table = self.resolver.table(key)?;
        Ok(DecisionState {
            label: key.to_string(),
            table,
            resolver: self.resolver.clone(),
        })
    }

    pub(crate) fn create_decision(&self, content: &[u8]) -> Result<DecisionState> {
        let table = Table::parse(content)?;
        Ok(DecisionState {
            label: table.name.clone().unwrap_or_else(|| "inline".to_string()),
            table: Arc::new(table),
            resolver: self.resolver.clone(),
        })
    }
}

pub(crate) struct DecisionState {
    label: String,
    table: Arc<Table>,
    resolver: Arc<Resolver>,
}

impl DecisionState {
    pub(crate) fn evaluate(&self, context: &Value, options: NativeOptions) -> Result<Value> {
        table::evaluate(&self.label, &self.table, context, self.resolver.as_ref(), options)
    }
}
