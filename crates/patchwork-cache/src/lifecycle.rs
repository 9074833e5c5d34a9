//! Flow lifecycle hooks that write through the optimistic gate

use crate::error::CacheError;
use crate::gate::OptimisticCacheGate;
use crate::query::QueryFetcher;
use patchwork_core::{EdgeDescriptor, FlowService, NodeDescriptor, NodeType, Position};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

const FLOW_KEY_PREFIX: &str = "flow:";

/// Cache key of a flow document
#[inline]
#[must_use]
pub fn flow_key(flow_id: &str) -> String {
    format!("{FLOW_KEY_PREFIX}{flow_id}")
}

/// [`QueryFetcher`] reading `flow:<id>` keys from a [`FlowService`]
#[derive(Clone)]
pub struct FlowFetcher {
    flows: Arc<dyn FlowService>,
}

impl FlowFetcher {
    /// Create fetcher over `flows`
    #[inline]
    #[must_use]
    pub fn new(flows: Arc<dyn FlowService>) -> Self {
        Self { flows }
    }
}

impl fmt::Debug for FlowFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowFetcher").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl QueryFetcher for FlowFetcher {
    async fn fetch(&self, key: &str) -> Result<Value, CacheError> {
        let flow_id = key
            .strip_prefix(FLOW_KEY_PREFIX)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CacheError::UnknownKey(key.to_string()))?;
        self.flows
            .get_flow(flow_id)
            .await
            .map_err(|source| CacheError::Fetch {
                key: key.to_string(),
                source,
            })
    }
}

/// Gives newly created flows a start node
#[derive(Clone)]
pub struct StartNodeBootstrapper {
    gate: OptimisticCacheGate,
    flows: Arc<dyn FlowService>,
}

impl StartNodeBootstrapper {
    /// Create bootstrapper writing through `gate` to `flows`
    #[inline]
    #[must_use]
    pub fn new(gate: OptimisticCacheGate, flows: Arc<dyn FlowService>) -> Self {
        Self { gate, flows }
    }

    /// Insert a start node into `flow_id` unless it already has one
    ///
    /// The cached flow shows the node immediately; the persisted node list is
    /// read and saved in the background of that update. Returns whether a
    /// node was inserted.
    pub async fn on_flow_created(&self, flow_id: &str) -> Result<bool, CacheError> {
        let key = flow_key(flow_id);
        let flow = self
            .flows
            .get_flow(flow_id)
            .await
            .map_err(|source| CacheError::Fetch {
                key: key.clone(),
                source,
            })?;
        let (mut nodes, edges) = graph_of(&key, &flow)?;

        if nodes.iter().any(|n| n.node_type == NodeType::Start) {
            tracing::debug!(flow_id, "flow already has a start node");
            return Ok(false);
        }

        let start = start_node(&nodes);
        let optimistic = append_node(serde_json::to_value(&start).map_err(|e| {
            CacheError::Malformed {
                key: key.clone(),
                reason: e.to_string(),
            }
        })?);
        nodes.push(start);

        let mutation = async {
            self.flows
                .update_nodes_and_edges(flow_id, nodes, edges)
                .await
                .map_err(|source| CacheError::Mutation {
                    key: key.clone(),
                    source,
                })
        };
        self.gate.run(&key, optimistic, mutation).await?;

        tracing::info!(flow_id, "inserted start node");
        Ok(true)
    }
}

impl fmt::Debug for StartNodeBootstrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartNodeBootstrapper")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

fn graph_of(
    key: &str,
    flow: &Value,
) -> Result<(Vec<NodeDescriptor>, Vec<EdgeDescriptor>), CacheError> {
    let malformed = |reason: String| CacheError::Malformed {
        key: key.to_string(),
        reason,
    };
    let list = |field: &str| flow.get(field).cloned().unwrap_or_else(|| Value::Array(Vec::new()));

    let nodes = serde_json::from_value(list("nodes")).map_err(|e| malformed(format!("nodes: {e}")))?;
    let edges = serde_json::from_value(list("edges")).map_err(|e| malformed(format!("edges: {e}")))?;
    Ok((nodes, edges))
}

fn start_node(existing: &[NodeDescriptor]) -> NodeDescriptor {
    let taken = |id: &str| existing.iter().any(|n| n.id == id);
    let id = if taken("start") {
        (1..)
            .map(|n| format!("start-{n}"))
            .find(|id| !taken(id))
            .unwrap_or_default()
    } else {
        "start".to_string()
    };
    NodeDescriptor {
        id,
        node_type: NodeType::Start,
        position: Position::default(),
        name: NodeType::Start.default_name().to_string(),
        color: String::new(),
        data: None,
        extra: Default::default(),
    }
}

fn append_node(node: Value) -> impl FnOnce(Option<Value>) -> Option<Value> + Send + 'static {
    move |cached: Option<Value>| {
        let mut flow = cached?;
        if let Some(fields) = flow.as_object_mut() {
            let nodes = fields
                .entry("nodes")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Some(list) = nodes.as_array_mut() {
                list.push(node);
            }
        }
        Some(flow)
    }
}
