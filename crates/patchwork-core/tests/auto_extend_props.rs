//! Property tests for index auto-extension

use patchwork_core::prelude::*;
use patchwork_test_utils::{set_field, TestBackend};
use proptest::prelude::*;
use serde_json::{json, Value};

fn scenarios(len: usize) -> Value {
    let items: Vec<Value> = (0..len)
        .map(|i| json!({"name": format!("s{i}"), "description": ""}))
        .collect();
    json!({"plot": {"scenarios": items}})
}

fn field() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("name"), Just("description")]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn set_past_the_end_extends_with_defaults(existing in 0usize..6, index in 0usize..24, field in field(), text in "[a-z ]{0,12}") {
        let engine = TestBackend::new().engine();
        let resource = scenarios(existing);
        let op = set_field("plot.scenarios", index, field, json!(text.clone()));

        let outcome = tokio_test::block_on(engine.apply(&resource, &[op]));

        prop_assert!(outcome.is_clean());
        let items = outcome.result["plot"]["scenarios"].as_array().unwrap();
        prop_assert_eq!(items.len(), existing.max(index + 1));
        prop_assert_eq!(&items[index][field], &json!(text));

        for (i, item) in items.iter().enumerate() {
            if i < existing {
                prop_assert_eq!(&item["name"], &resource["plot"]["scenarios"][i]["name"]);
            } else if i != index {
                prop_assert_eq!(item, &json!({"name": "", "description": ""}));
            }
        }
    }

    #[test]
    fn indexed_set_is_idempotent(index in 0usize..12, text in "[a-z]{1,8}") {
        let engine = TestBackend::new().engine();
        let op = set_field("plot.scenarios", index, "name", json!(text));

        let once = tokio_test::block_on(engine.apply(&json!({}), std::slice::from_ref(&op)));
        let twice = tokio_test::block_on(engine.apply(&json!({}), &[op.clone(), op]));

        prop_assert_eq!(once.result, twice.result);
    }
}
