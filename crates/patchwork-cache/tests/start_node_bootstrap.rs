//! Start node insertion through the optimistic gate

use patchwork_cache::{
    flow_key, CacheError, FlowFetcher, MokaQueryCache, OptimisticCacheGate, QueryCache,
    StartNodeBootstrapper,
};
use patchwork_core::ServiceError;
use patchwork_test_utils::{sample_flow, FaultyFlowStore};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

const NEW_FLOW: &str = "flow-new";

fn empty_flow() -> Value {
    json!({"id": NEW_FLOW, "name": "Fresh", "nodes": [], "edges": []})
}

struct Harness {
    flows: Arc<FaultyFlowStore>,
    cache: Arc<MokaQueryCache>,
    bootstrapper: StartNodeBootstrapper,
}

fn harness(flow: Value) -> Harness {
    let flows = Arc::new(FaultyFlowStore::with_flow(flow));
    let cache = Arc::new(MokaQueryCache::new(Arc::new(FlowFetcher::new(flows.clone()))));
    let bootstrapper =
        StartNodeBootstrapper::new(OptimisticCacheGate::new(cache.clone()), flows.clone());
    Harness {
        flows,
        cache,
        bootstrapper,
    }
}

#[tokio::test]
async fn new_flow_gets_a_persisted_start_node() {
    let h = harness(empty_flow());
    h.cache.fetch_query(&flow_key(NEW_FLOW)).await.unwrap();

    assert!(h.bootstrapper.on_flow_created(NEW_FLOW).await.unwrap());

    let stored = h.flows.stored(NEW_FLOW).unwrap();
    assert_eq!(stored["nodes"][0]["id"], "start");
    assert_eq!(stored["nodes"][0]["type"], "start");
    assert_eq!(h.flows.saves(), 1);

    let cached = h.cache.get_query_data(&flow_key(NEW_FLOW)).await.unwrap();
    assert_eq!(cached, stored);
}

#[tokio::test]
async fn flow_with_start_node_is_left_alone() {
    let h = harness(sample_flow());

    assert!(!h.bootstrapper.on_flow_created("flow-1").await.unwrap());
    assert_eq!(h.flows.saves(), 0);
}

#[tokio::test]
async fn existing_nodes_survive_bootstrap_unchanged() {
    let hook = json!({
        "id": "hook", "type": "webhook", "position": {"x": 4.0, "y": 2.0},
        "name": "Hook", "color": "", "width": 240
    });
    let mut flow = empty_flow();
    flow["nodes"] = json!([hook.clone()]);
    let h = harness(flow);

    assert!(h.bootstrapper.on_flow_created(NEW_FLOW).await.unwrap());

    let stored = h.flows.stored(NEW_FLOW).unwrap();
    assert_eq!(stored["nodes"][0], hook);
    assert_eq!(stored["nodes"][1]["type"], "start");
}

#[tokio::test]
async fn failed_save_restores_cached_flow() {
    let h = harness(empty_flow());
    let key = flow_key(NEW_FLOW);
    let before = h.cache.fetch_query(&key).await.unwrap();
    h.flows
        .fail_saves_with(ServiceError::Unavailable("write timeout".into()));

    let err = h.bootstrapper.on_flow_created(NEW_FLOW).await.unwrap_err();

    assert!(matches!(err, CacheError::Mutation { .. }));
    assert_eq!(h.cache.get_query_data(&key).await, Some(before));
    assert_eq!(h.flows.stored(NEW_FLOW).unwrap()["nodes"], json!([]));
}

#[tokio::test]
async fn failed_save_of_uncached_flow_leaves_cache_empty() {
    let h = harness(empty_flow());
    h.flows
        .fail_saves_with(ServiceError::Rejected("read only".into()));

    assert!(h.bootstrapper.on_flow_created(NEW_FLOW).await.is_err());
    assert_eq!(h.cache.get_query_data(&flow_key(NEW_FLOW)).await, None);
}

#[tokio::test]
async fn unknown_flow_is_a_fetch_error() {
    let h = harness(empty_flow());

    let err = h.bootstrapper.on_flow_created("missing").await.unwrap_err();

    assert!(err.is_fetch());
}

#[tokio::test]
async fn fetcher_rejects_foreign_keys() {
    let h = harness(empty_flow());

    let err = h.cache.fetch_query("agent:1").await.unwrap_err();

    assert!(matches!(err, CacheError::UnknownKey(_)));
}
