//! Node and edge creation saga
//!
//! ```text
//! ColorAssign -> LocalInsert -> BackendCreate -> Verify (retry) -> Persist -> Notify
//! ```
//!
//! Start and end nodes have no backend entity and skip straight from
//! LocalInsert to Persist. A failure after LocalInsert removes the local
//! node again; entities already created in a backend are left in place.
//!
//! Edges run `LocalInsert -> Persist -> Notify`. An edge that duplicates an
//! existing `(source, target)` pair is skipped without error.

use crate::config::EngineConfig;
use crate::error::{ProcessorError, ServiceError};
use crate::processors::doc::object_at;
use crate::processors::flow_id;
use crate::retry::RetryPolicy;
use crate::service::Services;
use crate::types::{
    AgentRecord, EdgeDescriptor, NodeCreateRequest, NodeDescriptor, NodeType, Position,
    ServiceEntity,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

/// Steps of the creation saga
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaStep {
    /// Pick an unused palette color
    ColorAssign,
    /// Push into the working copy
    LocalInsert,
    /// Create the per-type backend entity
    BackendCreate,
    /// Read the entity back
    Verify,
    /// Save full node and edge lists
    Persist,
    /// Broadcast to live views
    Notify,
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ColorAssign => "color_assign",
            Self::LocalInsert => "local_insert",
            Self::BackendCreate => "backend_create",
            Self::Verify => "verify",
            Self::Persist => "persist",
            Self::Notify => "notify",
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeInput {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    node_type: NodeType,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    position: Position,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct EdgeInput {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    source: String,
    #[serde(default)]
    target: String,
    #[serde(default)]
    source_handle: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(rename = "type", default)]
    edge_type: Option<String>,
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Typed view of `flow.nodes` / `flow.edges` in the working copy
struct Graph {
    nodes: Vec<NodeDescriptor>,
    edges: Vec<EdgeDescriptor>,
}

impl Graph {
    fn read(resource: &Value) -> Result<Self, ProcessorError> {
        let list = |key: &str| -> Value {
            resource
                .get("flow")
                .and_then(|flow| flow.get(key))
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new()))
        };
        let nodes = serde_json::from_value(list("nodes"))
            .map_err(|err| ProcessorError::rejected(format!("flow.nodes is malformed: {err}")))?;
        let edges = serde_json::from_value(list("edges"))
            .map_err(|err| ProcessorError::rejected(format!("flow.edges is malformed: {err}")))?;
        Ok(Self { nodes, edges })
    }

    fn write(&self, resource: &mut Value) -> Result<(), ProcessorError> {
        let flow = object_at(resource, &["flow"])?;
        flow.insert("nodes".to_string(), serde_json::to_value(&self.nodes)?);
        flow.insert("edges".to_string(), serde_json::to_value(&self.edges)?);
        Ok(())
    }
}

/// Runs node and edge creation (and index removal) against the services
#[derive(Debug, Clone)]
pub struct NodeCreationOrchestrator {
    services: Services,
    retry: RetryPolicy,
    default_edge_type: String,
}

impl NodeCreationOrchestrator {
    /// Create orchestrator with default retry policy
    #[must_use]
    pub fn new(services: Services) -> Self {
        Self {
            services,
            retry: RetryPolicy::verification_default(),
            default_edge_type: "default".to_string(),
        }
    }

    /// Create orchestrator from engine configuration
    #[must_use]
    pub fn from_config(services: Services, config: &EngineConfig) -> Self {
        Self::new(services)
            .with_retry(config.verification_retry)
            .with_default_edge_type(config.default_edge_type.clone())
    }

    /// With verification retry policy
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// With edge type broadcast for untyped edges
    #[inline]
    #[must_use]
    pub fn with_default_edge_type(mut self, edge_type: impl Into<String>) -> Self {
        self.default_edge_type = edge_type.into();
        self
    }

    /// Run the node creation saga for one `put flow.nodes`
    ///
    /// # Errors
    /// - `Rejected` for malformed input or a duplicate node id
    /// - `Service` when color assignment or backend creation fails
    /// - `Verification` when the created entity stays unreadable
    /// - `Persistence` when saving the node and edge lists fails
    pub async fn create_node(&self, resource: &mut Value, input: &Value) -> Result<NodeDescriptor, ProcessorError> {
        let flow_id = flow_id(resource)?;
        let input: NodeInput = serde_json::from_value(input.clone())
            .map_err(|err| ProcessorError::rejected(format!("invalid node: {err}")))?;
        if let NodeType::Other(name) = &input.node_type {
            return Err(ProcessorError::rejected(format!("invalid node: unknown node type '{name}'")));
        }
        let mut graph = Graph::read(resource)?;

        let name = input
            .name
            .unwrap_or_else(|| input.node_type.default_name().to_string());
        let mut node = NodeDescriptor {
            id: input.id.filter(|id| !id.is_empty()).unwrap_or_else(new_id),
            node_type: input.node_type,
            position: input.position,
            name,
            color: input.color.unwrap_or_default(),
            data: input.data,
            extra: Map::new(),
        };
        if graph.nodes.iter().any(|n| n.id == node.id) {
            return Err(ProcessorError::rejected(format!(
                "node '{}' already exists in flow '{flow_id}'",
                node.id
            )));
        }

        if node.node_type.has_backend() && node.color.is_empty() {
            self.step(&flow_id, &node, SagaStep::ColorAssign);
            let flow = resource.get("flow").cloned().unwrap_or(Value::Null);
            node.color = self
                .services
                .colors
                .next_available_color(&flow)
                .await
                .map_err(|e| ProcessorError::service("next_available_color", e))?;
        }

        self.step(&flow_id, &node, SagaStep::LocalInsert);
        graph.nodes.push(node.clone());
        graph.write(resource)?;

        match self.finish_node(&flow_id, &node, &graph).await {
            Ok(()) => Ok(node),
            Err(err) => {
                tracing::warn!(flow_id = %flow_id, node_id = %node.id, error = %err, "node creation failed, removing local insert");
                graph.nodes.retain(|n| n.id != node.id);
                graph.write(resource)?;
                Err(err)
            }
        }
    }

    async fn finish_node(&self, flow_id: &str, node: &NodeDescriptor, graph: &Graph) -> Result<(), ProcessorError> {
        if node.node_type.has_backend() {
            self.step(flow_id, node, SagaStep::BackendCreate);
            let entity = self.backend_create(flow_id, node).await?;
            tracing::debug!(node_id = %node.id, entity_id = %entity.id, "backend entity created");

            self.step(flow_id, node, SagaStep::Verify);
            self.retry
                .run(|attempt| {
                    tracing::debug!(node_id = %node.id, entity_id = %entity.id, attempt, "verifying entity");
                    self.backend_get(&node.node_type, &entity.id)
                })
                .await
                .map_err(|exhausted| ProcessorError::Verification {
                    entity_id: entity.id.clone(),
                    attempts: exhausted.attempts,
                    source: exhausted.last,
                })?;
        }

        self.persist_and_notify(flow_id, graph).await
    }

    async fn backend_create(&self, flow_id: &str, node: &NodeDescriptor) -> Result<ServiceEntity, ProcessorError> {
        match node.node_type {
            NodeType::DataStore => self
                .services
                .data_store_nodes
                .create(NodeCreateRequest::for_node(flow_id, node))
                .await
                .map_err(|e| ProcessorError::service("data_store_node.create", e)),
            NodeType::If => self
                .services
                .if_nodes
                .create(NodeCreateRequest::for_node(flow_id, node))
                .await
                .map_err(|e| ProcessorError::service("if_node.create", e)),
            NodeType::Agent => self
                .services
                .agents
                .save(AgentRecord::for_node(flow_id, node))
                .await
                .map_err(|e| ProcessorError::service("agent.save", e)),
            NodeType::Start | NodeType::End | NodeType::Other(_) => Err(ProcessorError::rejected(format!(
                "{} nodes have no backend entity",
                node.node_type
            ))),
        }
    }

    async fn backend_get(&self, node_type: &NodeType, id: &str) -> Result<ServiceEntity, ServiceError> {
        match node_type {
            NodeType::DataStore => self.services.data_store_nodes.get(id).await,
            NodeType::If => self.services.if_nodes.get(id).await,
            NodeType::Agent => self.services.agents.get(id).await,
            NodeType::Start | NodeType::End | NodeType::Other(_) => {
                Err(ServiceError::not_found(node_type.to_string(), id))
            }
        }
    }

    /// Create an edge for one `put flow.edges`
    ///
    /// Returns `None` when an edge with the same source and target exists.
    ///
    /// # Errors
    /// - `Rejected` for malformed input
    /// - `Persistence` when saving the node and edge lists fails
    pub async fn create_edge(&self, resource: &mut Value, input: &Value) -> Result<Option<EdgeDescriptor>, ProcessorError> {
        let flow_id = flow_id(resource)?;
        let input: EdgeInput = serde_json::from_value(input.clone())
            .map_err(|err| ProcessorError::rejected(format!("invalid edge: {err}")))?;
        if input.source.is_empty() || input.target.is_empty() {
            return Err(ProcessorError::rejected("edge requires source and target"));
        }

        let mut graph = Graph::read(resource)?;
        if graph.edges.iter().any(|e| e.connects(&input.source, &input.target)) {
            tracing::debug!(flow_id = %flow_id, source = %input.source, target = %input.target, "edge already exists, skipping");
            return Ok(None);
        }

        let edge = EdgeDescriptor {
            id: input.id.filter(|id| !id.is_empty()).unwrap_or_else(new_id),
            source: input.source,
            target: input.target,
            source_handle: input.source_handle,
            label: input.label,
            edge_type: input.edge_type,
            extra: Map::new(),
        };

        tracing::debug!(flow_id = %flow_id, edge_id = %edge.id, step = %SagaStep::LocalInsert, "edge saga step");
        graph.edges.push(edge.clone());
        graph.write(resource)?;

        if let Err(err) = self.persist_and_notify(&flow_id, &graph).await {
            tracing::warn!(flow_id = %flow_id, edge_id = %edge.id, error = %err, "edge creation failed, removing local insert");
            graph.edges.retain(|e| e.id != edge.id);
            graph.write(resource)?;
            return Err(err);
        }
        Ok(Some(edge))
    }

    /// Remove the node at `index` together with every edge touching it
    ///
    /// # Errors
    /// - `Rejected` when `index` is out of range
    /// - `Persistence` when saving fails; the working copy is left unchanged
    pub async fn remove_node(&self, resource: &mut Value, index: usize) -> Result<NodeDescriptor, ProcessorError> {
        let flow_id = flow_id(resource)?;
        let mut graph = Graph::read(resource)?;
        if index >= graph.nodes.len() {
            return Err(ProcessorError::rejected(format!(
                "node index {index} out of range ({} nodes)",
                graph.nodes.len()
            )));
        }

        let node = graph.nodes.remove(index);
        graph.edges.retain(|e| e.source != node.id && e.target != node.id);
        self.persist_and_notify(&flow_id, &graph).await?;
        graph.write(resource)?;
        Ok(node)
    }

    /// Remove the edge at `index`
    ///
    /// # Errors
    /// As [`NodeCreationOrchestrator::remove_node`].
    pub async fn remove_edge(&self, resource: &mut Value, index: usize) -> Result<EdgeDescriptor, ProcessorError> {
        let flow_id = flow_id(resource)?;
        let mut graph = Graph::read(resource)?;
        if index >= graph.edges.len() {
            return Err(ProcessorError::rejected(format!(
                "edge index {index} out of range ({} edges)",
                graph.edges.len()
            )));
        }

        let edge = graph.edges.remove(index);
        self.persist_and_notify(&flow_id, &graph).await?;
        graph.write(resource)?;
        Ok(edge)
    }

    async fn persist_and_notify(&self, flow_id: &str, graph: &Graph) -> Result<(), ProcessorError> {
        tracing::debug!(flow_id, step = %SagaStep::Persist, nodes = graph.nodes.len(), edges = graph.edges.len(), "saga step");
        self.services
            .flows
            .update_nodes_and_edges(flow_id, graph.nodes.clone(), graph.edges.clone())
            .await
            .map_err(|source| ProcessorError::Persistence {
                flow_id: flow_id.to_string(),
                source,
            })?;

        tracing::debug!(flow_id, step = %SagaStep::Notify, "saga step");
        let edges = graph
            .edges
            .iter()
            .cloned()
            .map(|mut edge| {
                edge.edge_type
                    .get_or_insert_with(|| self.default_edge_type.clone());
                edge
            })
            .collect();
        self.services
            .notifier
            .notify_nodes_edges_update(flow_id, graph.nodes.clone(), edges)
            .await;
        Ok(())
    }

    fn step(&self, flow_id: &str, node: &NodeDescriptor, step: SagaStep) {
        tracing::debug!(flow_id, node_id = %node.id, node_type = %node.node_type, step = %step, "saga step");
    }
}
