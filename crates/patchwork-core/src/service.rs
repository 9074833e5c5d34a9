//! External service contracts
//!
//! The engine never writes persisted state directly; every durable change
//! goes through one of these command APIs. Implementations live outside the
//! engine (see [`crate::memory`] for in-process ones).

use crate::error::ServiceResult;
use crate::types::{AgentRecord, EdgeDescriptor, NodeCreateRequest, NodeDescriptor, ServiceEntity};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Flow persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait FlowService: Send + Sync {
    /// Rename a flow
    async fn update_flow_name(&self, flow_id: &str, name: &str) -> ServiceResult<()>;

    /// Replace a flow's response template
    async fn update_response_template(&self, flow_id: &str, template: &str) -> ServiceResult<()>;

    /// Replace a flow's data-store schema
    async fn update_data_store_schema(&self, flow_id: &str, schema: &Value) -> ServiceResult<()>;

    /// Replace a flow's full node and edge lists
    async fn update_nodes_and_edges(
        &self,
        flow_id: &str,
        nodes: Vec<NodeDescriptor>,
        edges: Vec<EdgeDescriptor>,
    ) -> ServiceResult<()>;

    /// Read a flow
    async fn get_flow(&self, flow_id: &str) -> ServiceResult<Value>;
}

/// Data-store node entities
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait DataStoreNodeService: Send + Sync {
    /// Create entity
    async fn create(&self, request: NodeCreateRequest) -> ServiceResult<ServiceEntity>;

    /// Read entity
    async fn get(&self, id: &str) -> ServiceResult<ServiceEntity>;
}

/// If-node entities
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait IfNodeService: Send + Sync {
    /// Create entity
    async fn create(&self, request: NodeCreateRequest) -> ServiceResult<ServiceEntity>;

    /// Read entity
    async fn get(&self, id: &str) -> ServiceResult<ServiceEntity>;
}

/// Agent entities
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AgentService: Send + Sync {
    /// Create or overwrite agent
    async fn save(&self, agent: AgentRecord) -> ServiceResult<ServiceEntity>;

    /// Read agent
    async fn get(&self, id: &str) -> ServiceResult<ServiceEntity>;
}

/// Palette allocation shared by every view of a flow
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ColorAssigner: Send + Sync {
    /// Next color not yet used by the flow's nodes
    async fn next_available_color(&self, flow: &Value) -> ServiceResult<String>;
}

/// Live-view broadcast of graph changes
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait NodeEdgeNotifier: Send + Sync {
    /// Publish the full node/edge lists of a flow
    async fn notify_nodes_edges_update(
        &self,
        flow_id: &str,
        nodes: Vec<NodeDescriptor>,
        edges: Vec<EdgeDescriptor>,
    );
}

/// Every collaborator the processors need
#[derive(Clone)]
pub struct Services {
    /// Flow persistence
    pub flows: Arc<dyn FlowService>,
    /// Data-store node entities
    pub data_store_nodes: Arc<dyn DataStoreNodeService>,
    /// If-node entities
    pub if_nodes: Arc<dyn IfNodeService>,
    /// Agent entities
    pub agents: Arc<dyn AgentService>,
    /// Palette allocation
    pub colors: Arc<dyn ColorAssigner>,
    /// Live-view broadcast
    pub notifier: Arc<dyn NodeEdgeNotifier>,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
