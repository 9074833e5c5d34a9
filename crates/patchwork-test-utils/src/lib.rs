//! Testing utilities for the Patchwork workspace
//!
//! Shared fixtures, operation builders and fault-injecting service doubles.

#![allow(missing_docs)]

use parking_lot::Mutex;
use patchwork_core::memory::{
    GraphUpdate, InMemoryEntityStore, InMemoryFlowStore, PaletteColorAssigner,
};
use patchwork_core::{
    AgentRecord, AgentService, DataStoreNodeService, EdgeDescriptor, EngineConfig, FlowService,
    IfNodeService, NodeCreateRequest, NodeDescriptor, NodeEdgeNotifier, Operation, OperationEngine,
    RetryPolicy, ServiceEntity, ServiceError, ServiceResult, Services,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub const FLOW_ID: &str = "flow-1";

/// Flow document with one start node and no edges
pub fn sample_flow() -> Value {
    json!({
        "id": FLOW_ID,
        "name": "Story Router",
        "response_template": "{{narrator}}",
        "nodes": [
            {"id": "start", "type": "start", "position": {"x": 0.0, "y": 0.0}, "name": "Start", "color": ""}
        ],
        "edges": [],
        "data_store_schema": {"fields": []}
    })
}

/// Resource holding a flow under `flow`
pub fn flow_resource() -> Value {
    json!({ "flow": sample_flow() })
}

/// Character/plot card resource
pub fn card_resource() -> Value {
    json!({
        "character": {
            "name": "Ada",
            "description": "A clockmaker.",
            "lorebook": {"entries": []}
        },
        "plot": {
            "name": "The Tower",
            "scenarios": [],
            "lorebook": {"entries": []}
        }
    })
}

pub fn append(prefix: &str, value: Value) -> Operation {
    Operation::put(format!("{prefix}.append"), value)
}

pub fn put_at(prefix: &str, index: usize, value: Value) -> Operation {
    Operation::put(format!("{prefix}[{index}]"), value)
}

pub fn remove_at(prefix: &str, index: usize) -> Operation {
    Operation::remove(format!("{prefix}[{index}]"))
}

pub fn set_field(prefix: &str, index: usize, field: &str, value: Value) -> Operation {
    Operation::set(format!("{prefix}[{index}].{field}"), value)
}

pub fn create_node(node_type: &str, id: &str) -> Operation {
    Operation::put("flow.nodes", json!({"id": id, "type": node_type}))
}

pub fn create_edge(source: &str, target: &str) -> Operation {
    Operation::put("flow.edges", json!({"source": source, "target": target}))
}

/// Entity store whose reads fail a configurable number of times
#[derive(Debug, Default)]
pub struct FlakyEntityStore {
    inner: InMemoryEntityStore,
    failing_reads: AtomicU32,
    reads: AtomicU32,
}

impl FlakyEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` reads of any entity kind
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn entity_count(&self) -> usize {
        self.inner.len()
    }

    fn read_gate(&self, id: &str) -> ServiceResult<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match failing {
            Ok(_) => Err(ServiceError::not_found("entity", id)),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl DataStoreNodeService for FlakyEntityStore {
    async fn create(&self, request: NodeCreateRequest) -> ServiceResult<ServiceEntity> {
        DataStoreNodeService::create(&self.inner, request).await
    }

    async fn get(&self, id: &str) -> ServiceResult<ServiceEntity> {
        self.read_gate(id)?;
        DataStoreNodeService::get(&self.inner, id).await
    }
}

#[async_trait::async_trait]
impl IfNodeService for FlakyEntityStore {
    async fn create(&self, request: NodeCreateRequest) -> ServiceResult<ServiceEntity> {
        IfNodeService::create(&self.inner, request).await
    }

    async fn get(&self, id: &str) -> ServiceResult<ServiceEntity> {
        self.read_gate(id)?;
        IfNodeService::get(&self.inner, id).await
    }
}

#[async_trait::async_trait]
impl AgentService for FlakyEntityStore {
    async fn save(&self, agent: AgentRecord) -> ServiceResult<ServiceEntity> {
        self.inner.save(agent).await
    }

    async fn get(&self, id: &str) -> ServiceResult<ServiceEntity> {
        self.read_gate(id)?;
        AgentService::get(&self.inner, id).await
    }
}

/// Flow store that can be told to fail node/edge saves
#[derive(Debug, Default)]
pub struct FaultyFlowStore {
    inner: InMemoryFlowStore,
    fail_saves: Mutex<Option<ServiceError>>,
    saves: AtomicU32,
}

impl FaultyFlowStore {
    pub fn with_flow(flow: Value) -> Self {
        let store = Self::default();
        store.inner.insert_flow(flow).unwrap();
        store
    }

    /// Make every following `update_nodes_and_edges` fail with `error`
    pub fn fail_saves_with(&self, error: ServiceError) {
        *self.fail_saves.lock() = Some(error);
    }

    pub fn saves(&self) -> u32 {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn stored(&self, id: &str) -> Option<Value> {
        self.inner.flow(id)
    }
}

#[async_trait::async_trait]
impl FlowService for FaultyFlowStore {
    async fn update_flow_name(&self, flow_id: &str, name: &str) -> ServiceResult<()> {
        self.inner.update_flow_name(flow_id, name).await
    }

    async fn update_response_template(&self, flow_id: &str, template: &str) -> ServiceResult<()> {
        self.inner.update_response_template(flow_id, template).await
    }

    async fn update_data_store_schema(&self, flow_id: &str, schema: &Value) -> ServiceResult<()> {
        self.inner.update_data_store_schema(flow_id, schema).await
    }

    async fn update_nodes_and_edges(
        &self,
        flow_id: &str,
        nodes: Vec<NodeDescriptor>,
        edges: Vec<EdgeDescriptor>,
    ) -> ServiceResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        let failure = self.fail_saves.lock().clone();
        if let Some(error) = failure {
            return Err(error);
        }
        self.inner.update_nodes_and_edges(flow_id, nodes, edges).await
    }

    async fn get_flow(&self, flow_id: &str) -> ServiceResult<Value> {
        self.inner.get_flow(flow_id).await
    }
}

/// Notifier that keeps every update it receives
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    updates: Mutex<Vec<GraphUpdate>>,
}

impl RecordingNotifier {
    pub fn updates(&self) -> Vec<GraphUpdate> {
        self.updates.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.updates.lock().len()
    }
}

#[async_trait::async_trait]
impl NodeEdgeNotifier for RecordingNotifier {
    async fn notify_nodes_edges_update(
        &self,
        flow_id: &str,
        nodes: Vec<NodeDescriptor>,
        edges: Vec<EdgeDescriptor>,
    ) {
        self.updates.lock().push(GraphUpdate {
            flow_id: flow_id.to_string(),
            nodes,
            edges,
        });
    }
}

/// Service doubles for one flow, with handles for fault injection
#[derive(Debug, Clone)]
pub struct TestBackend {
    pub flows: Arc<FaultyFlowStore>,
    pub entities: Arc<FlakyEntityStore>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestBackend {
    /// Backend seeded with [`sample_flow`]
    pub fn new() -> Self {
        Self::with_flow(sample_flow())
    }

    pub fn with_flow(flow: Value) -> Self {
        Self {
            flows: Arc::new(FaultyFlowStore::with_flow(flow)),
            entities: Arc::new(FlakyEntityStore::new()),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    pub fn services(&self) -> Services {
        let palette = EngineConfig::default().palette;
        Services {
            flows: self.flows.clone(),
            data_store_nodes: self.entities.clone(),
            if_nodes: self.entities.clone(),
            agents: self.entities.clone(),
            colors: Arc::new(PaletteColorAssigner::new(palette)),
            notifier: self.notifier.clone(),
        }
    }

    /// Engine over these doubles with zero-delay verification retries
    pub fn engine(&self) -> OperationEngine {
        let config = EngineConfig::new().with_verification_retry(RetryPolicy::immediate(2));
        OperationEngine::builder()
            .config(config)
            .services(self.services())
            .build()
            .unwrap()
    }

    /// Node ids persisted for [`FLOW_ID`]
    pub fn persisted_node_ids(&self) -> Vec<String> {
        self.flows
            .stored(FLOW_ID)
            .and_then(|flow| flow.get("nodes").cloned())
            .and_then(|nodes| serde_json::from_value::<Vec<NodeDescriptor>>(nodes).ok())
            .map(|nodes| nodes.into_iter().map(|n| n.id).collect())
            .unwrap_or_default()
    }
}

impl Default for TestBackend {
    fn default() -> Self {
        Self::new()
    }
}
