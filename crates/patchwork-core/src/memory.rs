//! In-process service implementations
//!
//! Backed by `dashmap` so one instance can be shared across tasks. Used by
//! the CLI and by tests; a deployment plugs in its own [`Services`].

use crate::config::EngineConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::service::{
    AgentService, ColorAssigner, DataStoreNodeService, FlowService, IfNodeService,
    NodeEdgeNotifier, Services,
};
use crate::types::{AgentRecord, EdgeDescriptor, NodeCreateRequest, NodeDescriptor, ServiceEntity};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Flows keyed by id
#[derive(Debug, Default)]
pub struct InMemoryFlowStore {
    flows: DashMap<String, Value>,
}

impl InMemoryFlowStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a flow document (must carry a string `id`)
    ///
    /// # Errors
    /// `ServiceError::Rejected` when the document has no id.
    pub fn insert_flow(&self, flow: Value) -> ServiceResult<()> {
        let id = flow
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ServiceError::Rejected("flow document has no id".into()))?
            .to_string();
        self.flows.insert(id, flow);
        Ok(())
    }

    /// Snapshot of a stored flow
    #[must_use]
    pub fn flow(&self, id: &str) -> Option<Value> {
        self.flows.get(id).map(|entry| entry.value().clone())
    }

    /// Number of stored flows
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    /// Check if store is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    fn update<F>(&self, id: &str, f: F) -> ServiceResult<()>
    where
        F: FnOnce(&mut serde_json::Map<String, Value>),
    {
        let mut flow = self
            .flows
            .get_mut(id)
            .ok_or_else(|| ServiceError::not_found("flow", id))?;
        match flow.value_mut() {
            Value::Object(fields) => {
                f(fields);
                Ok(())
            }
            _ => Err(ServiceError::Rejected(format!("flow '{id}' is not an object"))),
        }
    }
}

#[async_trait::async_trait]
impl FlowService for InMemoryFlowStore {
    async fn update_flow_name(&self, flow_id: &str, name: &str) -> ServiceResult<()> {
        self.update(flow_id, |flow| {
            flow.insert("name".into(), json!(name));
        })
    }

    async fn update_response_template(&self, flow_id: &str, template: &str) -> ServiceResult<()> {
        self.update(flow_id, |flow| {
            flow.insert("response_template".into(), json!(template));
        })
    }

    async fn update_data_store_schema(&self, flow_id: &str, schema: &Value) -> ServiceResult<()> {
        self.update(flow_id, |flow| {
            flow.insert("data_store_schema".into(), schema.clone());
        })
    }

    async fn update_nodes_and_edges(
        &self,
        flow_id: &str,
        nodes: Vec<NodeDescriptor>,
        edges: Vec<EdgeDescriptor>,
    ) -> ServiceResult<()> {
        let nodes = serde_json::to_value(nodes).map_err(|e| ServiceError::Rejected(e.to_string()))?;
        let edges = serde_json::to_value(edges).map_err(|e| ServiceError::Rejected(e.to_string()))?;
        self.update(flow_id, |flow| {
            flow.insert("nodes".into(), nodes);
            flow.insert("edges".into(), edges);
        })
    }

    async fn get_flow(&self, flow_id: &str) -> ServiceResult<Value> {
        self.flow(flow_id)
            .ok_or_else(|| ServiceError::not_found("flow", flow_id))
    }
}

/// Data-store, if-node and agent entities
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    data_store_nodes: DashMap<String, ServiceEntity>,
    if_nodes: DashMap<String, ServiceEntity>,
    agents: DashMap<String, ServiceEntity>,
}

impl InMemoryEntityStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total entities across all kinds
    #[must_use]
    pub fn len(&self) -> usize {
        self.data_store_nodes.len() + self.if_nodes.len() + self.agents.len()
    }

    /// Check if store is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn node_entity(request: NodeCreateRequest) -> ServiceEntity {
        ServiceEntity {
            id: request.node_id,
            data: json!({
                "flow_id": request.flow_id,
                "name": request.name,
                "color": request.color,
                "data": request.data,
            }),
        }
    }

    fn lookup(map: &DashMap<String, ServiceEntity>, entity: &str, id: &str) -> ServiceResult<ServiceEntity> {
        map.get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| ServiceError::not_found(entity, id))
    }
}

#[async_trait::async_trait]
impl DataStoreNodeService for InMemoryEntityStore {
    async fn create(&self, request: NodeCreateRequest) -> ServiceResult<ServiceEntity> {
        let entity = Self::node_entity(request);
        self.data_store_nodes.insert(entity.id.clone(), entity.clone());
        Ok(entity)
    }

    async fn get(&self, id: &str) -> ServiceResult<ServiceEntity> {
        Self::lookup(&self.data_store_nodes, "data-store node", id)
    }
}

#[async_trait::async_trait]
impl IfNodeService for InMemoryEntityStore {
    async fn create(&self, request: NodeCreateRequest) -> ServiceResult<ServiceEntity> {
        let entity = Self::node_entity(request);
        self.if_nodes.insert(entity.id.clone(), entity.clone());
        Ok(entity)
    }

    async fn get(&self, id: &str) -> ServiceResult<ServiceEntity> {
        Self::lookup(&self.if_nodes, "if node", id)
    }
}

#[async_trait::async_trait]
impl AgentService for InMemoryEntityStore {
    async fn save(&self, agent: AgentRecord) -> ServiceResult<ServiceEntity> {
        let entity = ServiceEntity {
            id: agent.id.clone(),
            data: serde_json::to_value(&agent).map_err(|e| ServiceError::Rejected(e.to_string()))?,
        };
        self.agents.insert(entity.id.clone(), entity.clone());
        Ok(entity)
    }

    async fn get(&self, id: &str) -> ServiceResult<ServiceEntity> {
        Self::lookup(&self.agents, "agent", id)
    }
}

/// Hands out the first palette color not used by the flow's nodes
#[derive(Debug, Clone)]
pub struct PaletteColorAssigner {
    palette: Vec<String>,
}

impl PaletteColorAssigner {
    /// Create assigner over `palette`
    #[inline]
    #[must_use]
    pub fn new(palette: Vec<String>) -> Self {
        Self { palette }
    }
}

#[async_trait::async_trait]
impl ColorAssigner for PaletteColorAssigner {
    async fn next_available_color(&self, flow: &Value) -> ServiceResult<String> {
        if self.palette.is_empty() {
            return Err(ServiceError::Unavailable("palette is empty".into()));
        }
        let used: Vec<&str> = flow
            .get("nodes")
            .and_then(Value::as_array)
            .map(|nodes| {
                nodes
                    .iter()
                    .filter_map(|n| n.get("color").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        let color = self
            .palette
            .iter()
            .find(|c| !used.contains(&c.as_str()))
            .unwrap_or(&self.palette[used.len() % self.palette.len()]);
        Ok(color.clone())
    }
}

/// One graph change as seen by live views
#[derive(Debug, Clone, PartialEq)]
pub struct GraphUpdate {
    /// Flow the change belongs to
    pub flow_id: String,
    /// Full node list after the change
    pub nodes: Vec<NodeDescriptor>,
    /// Full edge list after the change
    pub edges: Vec<EdgeDescriptor>,
}

/// Fans graph updates out to subscribers
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<GraphUpdate>,
}

impl BroadcastNotifier {
    /// Create notifier buffering up to `capacity` updates per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to future updates
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GraphUpdate> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait::async_trait]
impl NodeEdgeNotifier for BroadcastNotifier {
    async fn notify_nodes_edges_update(
        &self,
        flow_id: &str,
        nodes: Vec<NodeDescriptor>,
        edges: Vec<EdgeDescriptor>,
    ) {
        let update = GraphUpdate {
            flow_id: flow_id.to_string(),
            nodes,
            edges,
        };
        if self.sender.send(update).is_err() {
            tracing::trace!(flow_id, "no live views subscribed");
        }
    }
}

/// Every in-memory service, wired together
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    /// Flow store
    pub flows: Arc<InMemoryFlowStore>,
    /// Entity store
    pub entities: Arc<InMemoryEntityStore>,
    /// Color assigner
    pub colors: Arc<PaletteColorAssigner>,
    /// Notifier
    pub notifier: Arc<BroadcastNotifier>,
}

impl InMemoryBackend {
    /// Create backend using the configured palette
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            flows: Arc::new(InMemoryFlowStore::new()),
            entities: Arc::new(InMemoryEntityStore::new()),
            colors: Arc::new(PaletteColorAssigner::new(config.palette.clone())),
            notifier: Arc::new(BroadcastNotifier::default()),
        }
    }

    /// Service bundle backed by these stores
    #[must_use]
    pub fn services(&self) -> Services {
        Services {
            flows: self.flows.clone(),
            data_store_nodes: self.entities.clone(),
            if_nodes: self.entities.clone(),
            agents: self.entities.clone(),
            colors: self.colors.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeType;

    fn node(id: &str, color: &str) -> NodeDescriptor {
        NodeDescriptor {
            id: id.into(),
            node_type: NodeType::Agent,
            position: Default::default(),
            name: id.into(),
            color: color.into(),
            data: None,
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn flow_store_updates_fields() {
        let store = InMemoryFlowStore::new();
        store.insert_flow(json!({"id": "f1", "name": "a"})).unwrap();
        store.update_flow_name("f1", "b").await.unwrap();
        store
            .update_nodes_and_edges("f1", vec![node("n1", "#fff")], vec![])
            .await
            .unwrap();

        let flow = store.get_flow("f1").await.unwrap();
        assert_eq!(flow["name"], "b");
        assert_eq!(flow["nodes"][0]["id"], "n1");
        assert_eq!(flow["edges"], json!([]));
    }

    #[tokio::test]
    async fn flow_store_reports_missing_flow() {
        let store = InMemoryFlowStore::new();
        let err = store.update_flow_name("nope", "x").await.unwrap_err();
        assert_eq!(err, ServiceError::not_found("flow", "nope"));
        assert!(store.insert_flow(json!({"name": "no id"})).is_err());
    }

    #[tokio::test]
    async fn entity_store_round_trips_by_kind() {
        let store = InMemoryEntityStore::new();
        let request = NodeCreateRequest {
            flow_id: "f1".into(),
            node_id: "n1".into(),
            name: "If".into(),
            color: "#fff".into(),
            data: None,
        };
        IfNodeService::create(&store, request).await.unwrap();

        assert!(IfNodeService::get(&store, "n1").await.is_ok());
        assert!(DataStoreNodeService::get(&store, "n1").await.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn palette_skips_used_colors_and_cycles() {
        let palette = vec!["red".to_string(), "blue".to_string()];
        let assigner = PaletteColorAssigner::new(palette);

        let flow = json!({"nodes": [{"color": "red"}]});
        assert_eq!(assigner.next_available_color(&flow).await.unwrap(), "blue");

        let flow = json!({"nodes": [{"color": "red"}, {"color": "blue"}, {"color": "red"}]});
        assert_eq!(assigner.next_available_color(&flow).await.unwrap(), "blue");

        assert_eq!(assigner.next_available_color(&json!({})).await.unwrap(), "red");
    }

    #[tokio::test]
    async fn notifier_fans_out() {
        let notifier = BroadcastNotifier::new(4);
        let mut rx = notifier.subscribe();
        notifier
            .notify_nodes_edges_update("f1", vec![node("n1", "red")], vec![])
            .await;

        let update = rx.recv().await.unwrap();
        assert_eq!(update.flow_id, "f1");
        assert_eq!(update.nodes.len(), 1);
    }

    #[tokio::test]
    async fn notify_without_subscribers_is_fine() {
        BroadcastNotifier::default()
            .notify_nodes_edges_update("f1", vec![], vec![])
            .await;
    }
}
