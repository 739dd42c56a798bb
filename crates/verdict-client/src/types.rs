//! Evaluation request options and response envelope

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use verdict_abi::NativeOptions;

use crate::error::{ClientError, Result};

/// Options for a single evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationOptions {
    /// Ask the native core to return a trace
    pub trace: bool,

    /// Levels of referenced sub-decisions the core may resolve (at least 1)
    pub max_depth: u8,
}

impl EvaluationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Values below 1 are raised to 1.
    pub fn with_max_depth(mut self, max_depth: u8) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            trace: false,
            max_depth: 1,
        }
    }
}

impl From<EvaluationOptions> for NativeOptions {
    fn from(options: EvaluationOptions) -> Self {
        NativeOptions {
            trace: options.trace,
            max_depth: options.max_depth.max(1),
        }
    }
}

impl From<NativeOptions> for EvaluationOptions {
    fn from(options: NativeOptions) -> Self {
        EvaluationOptions {
            trace: options.trace,
            max_depth: options.max_depth,
        }
    }
}

/// Decoded native response
///
/// Owns no native memory; the native buffer is released right after decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    /// Engine-reported timing, opaque to the client
    pub performance: String,

    pub result: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Value>,
}

impl EvaluationResponse {
    /// Deserialize `result` into a concrete type.
    pub fn result_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.result.clone()).map_err(|e| ClientError::Decoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_options() {
        let options = EvaluationOptions::default();
        assert!(!options.trace);
        assert_eq!(options.max_depth, 1);
    }

    #[test]
    fn test_options_round_trip_through_boundary() {
        let options = EvaluationOptions::new().with_trace(true).with_max_depth(3);
        let native: NativeOptions = options.into();
        assert_eq!(native, NativeOptions { trace: true, max_depth: 3 });

        let back: EvaluationOptions = native.into();
        assert_eq!(back, options);
    }

    #[test]
    fn test_zero_depth_is_raised() {
        assert_eq!(EvaluationOptions::new().with_max_depth(0).max_depth, 1);

        let raw = EvaluationOptions { trace: false, max_depth: 0 };
        let native: NativeOptions = raw.into();
        assert_eq!(native.max_depth, 1);
    }

    #[test]
    fn test_response_without_trace() {
        let response: EvaluationResponse =
            serde_json::from_str(r#"{"performance":"1.2µs","result":{"output":10}}"#).unwrap();
        assert_eq!(response.result, json!({"output": 10}));
        assert!(response.trace.is_none());
    }

    #[test]
    fn test_result_as() {
        #[derive(Deserialize)]
        struct Output {
            output: i64,
        }

        let response = EvaluationResponse {
            performance: String::new(),
            result: json!({"output": 10}),
            trace: None,
        };
        assert_eq!(response.result_as::<Output>().unwrap().output, 10);
        assert!(response.result_as::<Vec<String>>().is_err());
    }
}
