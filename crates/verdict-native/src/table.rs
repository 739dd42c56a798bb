//! Decision tables and their evaluation
//!
//! A table is an ordered list of rules. The first rule whose `when` entries
//! all equal the context values at the given dotted paths wins. A rule
//! either produces `then` directly or delegates to another table by key.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use verdict_abi::NativeOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub name: Option<String>,
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub when: Map<String, Value>,
    #[serde(default)]
    pub then: Option<Value>,
    /// Key of a table to delegate to when this rule matches
    #[serde(default)]
    pub decision: Option<String>,
}

impl Table {
    pub fn parse(content: &[u8]) -> Result<Self> {
        serde_json::from_slice(content).map_err(|e| anyhow!("JSON_PARSE: {}", e))
    }

    fn first_match(&self, context: &Value) -> Option<(usize, &Rule)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(context))
    }
}

impl Rule {
    fn matches(&self, context: &Value) -> bool {
        self.when
            .iter()
            .all(|(path, expected)| lookup(context, path) == Some(expected))
    }
}

fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(context, |value, segment| value.get(segment))
}

/// Resolves table keys referenced by other tables.
pub trait TableSource {
    fn table(&self, key: &str) -> Result<Arc<Table>>;
}

/// Evaluate `table` and build the response envelope
/// (`performance`, `result`, and `trace` when requested).
pub fn evaluate(
    label: &str,
    table: &Table,
    context: &Value,
    source: &dyn TableSource,
    options: NativeOptions,
) -> Result<Value> {
    let started = Instant::now();
    let mut trace = options.trace.then(Vec::new);

    let walk = Walk {
        source,
        max_depth: options.max_depth.max(1),
    };
    let result = walk.visit(label, table, context, 1, &mut trace)?;

    let mut envelope = Map::new();
    envelope.insert(
        "performance".to_string(),
        Value::String(format!("{:.1?}", started.elapsed())),
    );
    envelope.insert("result".to_string(), result);
    if let Some(steps) = trace {
        envelope.insert("trace".to_string(), Value::Array(steps));
    }

    Ok(Value::Object(envelope))
}

struct Walk<'a> {
    source: &'a dyn TableSource,
    max_depth: u8,
}

impl Walk<'_> {
    fn visit(
        &self,
        label: &str,
        table: &Table,
        context: &Value,
        depth: u8,
        trace: &mut Option<Vec<Value>>,
    ) -> Result<Value> {
        let matched = table.first_match(context);

        let output = match matched {
            None => json!({}),
            Some((_, rule)) => match &rule.decision {
                Some(key) => {
                    if depth >= self.max_depth {
                        bail!(
                            "DEPTH_LIMIT: decision '{}' referenced from '{}' exceeds max depth {}",
                            key,
                            label,
                            self.max_depth
                        );
                    }
                    let child = self.source.table(key)?;
                    self.visit(key, &child, context, depth + 1, trace)?
                }
                None => rule.then.clone().unwrap_or_else(|| json!({})),
            },
        };

        if let Some(steps) = trace.as_mut() {
            steps.push(json!({
                "decision": label,
                "depth": depth,
                "rule": matched.map(|(index, _)| index),
                "input": context,
                "output": output,
            }));
        }

        Ok(output)
    }
}
