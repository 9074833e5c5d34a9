//! Commands driven the way the binary drives them

use patchwork_cli::{apply_batch, bootstrap_flow, load_config, pattern_lines, read_json, render_json};
use patchwork_core::{Domain, EngineConfig, ErrorKind, Operation};
use patchwork_test_utils::{append, card_resource, create_edge, flow_resource};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::PathBuf;

fn scratch(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("patchwork-cli-{}-{name}", std::process::id()));
    std::fs::write(&path, contents).unwrap();
    path
}

#[tokio::test]
async fn apply_reports_successes_and_failures() {
    let operations: Vec<Operation> = serde_json::from_value(json!([
        {"path": "plot.scenarios.append", "operation": "put", "value": {"name": "Intro"}},
        {"path": "character.nickname", "operation": "set", "value": "Ada"}
    ]))
    .unwrap();

    let outcome = apply_batch(EngineConfig::default(), &card_resource(), &operations)
        .await
        .unwrap();

    assert_eq!(outcome.success_count, 1);
    assert_eq!(outcome.errors[0].kind, ErrorKind::HandlerFailure);
    assert_eq!(outcome.result["plot"]["scenarios"][0]["name"], "Intro");

    let wire = serde_json::to_value(&outcome).unwrap();
    assert_eq!(wire["successCount"], 1);
}

#[tokio::test]
async fn apply_seeds_the_flow_store_from_the_resource() {
    let outcome = apply_batch(
        EngineConfig::default(),
        &flow_resource(),
        &[
            Operation::put("flow.nodes", json!({"id": "fin", "type": "end"})),
            create_edge("start", "fin"),
        ],
    )
    .await
    .unwrap();

    assert!(outcome.is_clean(), "{:?}", outcome.errors);
    assert_eq!(outcome.result["flow"]["edges"][0]["target"], "fin");
}

#[tokio::test]
async fn apply_honors_a_config_file() {
    let path = scratch("config.toml", "disabled_domains = [\"plot\"]\n");
    let config = load_config(Some(&path)).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(config.disabled_domains, vec![Domain::Plot]);

    let outcome = apply_batch(config, &card_resource(), &[append("plot.scenarios", json!({}))])
        .await
        .unwrap();
    assert_eq!(outcome.errors[0].kind, ErrorKind::NoProcessorFound);
}

#[test]
fn missing_config_file_is_an_error() {
    assert!(load_config(Some(std::path::Path::new("/definitely/not/here.toml"))).is_err());
    assert_eq!(load_config(None).unwrap(), EngineConfig::default());
}

#[test]
fn patterns_list_every_domain_in_order() {
    let lines = pattern_lines(EngineConfig::default().with_disabled_domain(Domain::IfNode)).unwrap();

    assert!(lines[0].starts_with("character"));
    assert!(lines.iter().any(|l| l.contains("flow.nodes")));
    assert!(lines
        .iter()
        .filter(|l| l.contains("if_node."))
        .all(|l| l.ends_with("(disabled)")));
}

#[tokio::test]
async fn bootstrap_returns_the_cached_flow() {
    let cached = bootstrap_flow(
        &EngineConfig::default(),
        json!({"id": "fresh", "nodes": [], "edges": []}),
    )
    .await
    .unwrap();
    assert_eq!(cached["nodes"][0]["type"], "start");

    let err = bootstrap_flow(&EngineConfig::default(), json!({"nodes": []}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no id"));
}

#[test]
fn json_files_round_trip_through_the_renderer() {
    let path = scratch("resource.json", r#"{"plot": {"name": "The Tower"}}"#);
    let value = read_json(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(render_json(&value, true).unwrap(), r#"{"plot":{"name":"The Tower"}}"#);
    assert!(render_json(&value, false).unwrap().contains('\n'));
}
