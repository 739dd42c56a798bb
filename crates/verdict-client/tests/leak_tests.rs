//! Boundary allocation accounting
//!
//! Kept in its own binary with a single test: the native counters are
//! process-wide and any parallel test would perturb them.

mod common;

use common::{fixture_engine, library, TABLE};
use serde_json::json;
use verdict_client::{ClientError, Engine, EvaluationOptions};
use verdict_native::allocation_stats;

#[test]
fn test_no_native_allocation_outlives_its_handle() {
    let baseline = allocation_stats();

    {
        let engine = fixture_engine();

        // Loader failure: both the loader's error string and the core's
        // error string freed, nothing handed out.
        let err = engine.get_decision("missing.json").unwrap_err();
        assert!(matches!(&err, ClientError::DecisionLoad(m) if m == "decision not found: missing.json"));
        assert_eq!(allocation_stats().strings, baseline.strings);
        assert_eq!(allocation_stats().host_strings, baseline.host_strings);

        // Lazy load of a referenced table: loader content strings freed.
        engine
            .evaluate_with_opts(
                "parent.json",
                &json!({"input": 15}),
                EvaluationOptions::new().with_max_depth(2),
            )
            .unwrap();
        assert_eq!(allocation_stats().host_strings, baseline.host_strings);

        // Successful evaluation, with and without trace.
        engine.evaluate("table.json", &json!({"input": 15})).unwrap();
        engine
            .evaluate_with_opts(
                "table.json",
                &json!({"input": 15}),
                EvaluationOptions::new().with_trace(true),
            )
            .unwrap();

        // Evaluation errors.
        engine.evaluate("missing.json", &json!({})).unwrap_err();
        engine.evaluate("parent.json", &json!({"input": 15})).unwrap_err();

        // Malformed table bytes.
        engine.create_decision(b"{ not json").unwrap_err();

        let decision = engine.create_decision(TABLE.as_bytes()).unwrap();
        decision.evaluate(&json!({"input": 15})).unwrap();
        assert_eq!(allocation_stats().decisions, baseline.decisions + 1);
        assert_eq!(allocation_stats().strings, baseline.strings);
        decision.dispose();

        assert_eq!(allocation_stats().engines, baseline.engines + 1);
    }

    {
        let engine = Engine::new(&library()).unwrap();
        let decision = engine.get_decision("table.json");
        assert!(decision.is_err());
    }

    assert_eq!(allocation_stats(), baseline);
}
