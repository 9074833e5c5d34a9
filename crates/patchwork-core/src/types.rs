//! Core types for the operation engine
//!
//! Defines the wire shapes exchanged with the assistant and the services:
//! - Operations and their kinds
//! - Node and edge descriptors for flow graphs
//! - Service request/response records
//! - Batch outcomes

use crate::error::OperationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Resource documents are untyped JSON trees keyed by domain root
pub type Resource = Value;

/// Kind of edit an operation performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Insert or replace (append, indexed replace, node/edge creation)
    Put,
    /// Assign a single field
    Set,
    /// Delete an element or field
    Remove,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Put => "put",
            Self::Set => "set",
            Self::Remove => "remove",
        })
    }
}

/// A path-addressed edit instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Dot-segmented address with `[n]` indices
    pub path: String,
    /// What to do at the address
    pub operation: OperationKind,
    /// Payload (ignored by most `remove` processors)
    #[serde(default)]
    pub value: Value,
}

impl Operation {
    /// Create operation
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<String>, operation: OperationKind, value: Value) -> Self {
        Self {
            path: path.into(),
            operation,
            value,
        }
    }

    /// `put` shorthand
    #[inline]
    #[must_use]
    pub fn put(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, OperationKind::Put, value)
    }

    /// `set` shorthand
    #[inline]
    #[must_use]
    pub fn set(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, OperationKind::Set, value)
    }

    /// `remove` shorthand
    #[inline]
    #[must_use]
    pub fn remove(path: impl Into<String>) -> Self {
        Self::new(path, OperationKind::Remove, Value::Null)
    }
}

/// Flow node types
///
/// Types this engine does not know are kept as [`NodeType::Other`] so stored
/// graphs written by newer clients still round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    /// Flow entry point
    Start,
    /// Flow exit point
    End,
    /// Prompted model call
    Agent,
    /// Data-store update node
    DataStore,
    /// Conditional branch node
    If,
    /// Any other type name, carried through unchanged
    Other(String),
}

impl From<String> for NodeType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "start" => Self::Start,
            "end" => Self::End,
            "agent" => Self::Agent,
            "dataStore" => Self::DataStore,
            "if" => Self::If,
            _ => Self::Other(name),
        }
    }
}

impl From<NodeType> for String {
    fn from(node_type: NodeType) -> Self {
        node_type.to_string()
    }
}

impl NodeType {
    /// Whether nodes of this type are backed by a per-type service entity
    #[inline]
    #[must_use]
    pub fn has_backend(&self) -> bool {
        matches!(self, Self::Agent | Self::DataStore | Self::If)
    }

    /// Name given to a node created without one
    #[must_use]
    pub fn default_name(&self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::End => "End",
            Self::Agent => "New Agent",
            Self::DataStore => "Data Update",
            Self::If => "If",
            Self::Other(_) => "Node",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Agent => "agent",
            Self::DataStore => "dataStore",
            Self::If => "if",
            Self::Other(name) => name,
        })
    }
}

/// Canvas position
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

/// A node in a flow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Node id (also the backend entity id)
    pub id: String,
    /// Node type
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Canvas position
    #[serde(default)]
    pub position: Position,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Palette color assigned at creation
    #[serde(default)]
    pub color: String,
    /// Type-specific payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Properties this engine does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An edge in a flow graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDescriptor {
    /// Edge id
    pub id: String,
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Output handle on the source node (if-node branches)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    /// Optional label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Edge renderer type
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
    /// Properties this engine does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EdgeDescriptor {
    /// Whether this edge connects the same pair of nodes
    #[inline]
    #[must_use]
    pub fn connects(&self, source: &str, target: &str) -> bool {
        self.source == source && self.target == target
    }
}

/// Entity returned by the per-type node services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntity {
    /// Entity id
    pub id: String,
    /// Stored payload
    #[serde(default)]
    pub data: Value,
}

/// Creation request for data-store and if nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCreateRequest {
    /// Owning flow
    pub flow_id: String,
    /// Id to create the entity under
    pub node_id: String,
    /// Display name
    pub name: String,
    /// Assigned color
    pub color: String,
    /// Type-specific payload
    #[serde(default)]
    pub data: Option<Value>,
}

impl NodeCreateRequest {
    /// Build request for a node about to be created in `flow_id`
    #[must_use]
    pub fn for_node(flow_id: &str, node: &NodeDescriptor) -> Self {
        Self {
            flow_id: flow_id.to_string(),
            node_id: node.id.clone(),
            name: node.name.clone(),
            color: node.color.clone(),
            data: node.data.clone(),
        }
    }
}

/// Agent record saved through the agent service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Agent id (same as its node id)
    pub id: String,
    /// Owning flow
    pub flow_id: String,
    /// Display name
    pub name: String,
    /// Assigned color
    pub color: String,
    /// Prompt/model payload
    #[serde(default)]
    pub data: Option<Value>,
}

impl AgentRecord {
    /// Build record for an agent node about to be created in `flow_id`
    #[must_use]
    pub fn for_node(flow_id: &str, node: &NodeDescriptor) -> Self {
        Self {
            id: node.id.clone(),
            flow_id: flow_id.to_string(),
            name: node.name.clone(),
            color: node.color.clone(),
            data: node.data.clone(),
        }
    }
}

/// Result of applying one batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    /// Fully mutated working copy
    pub result: Resource,
    /// One entry per failed operation, in batch order
    pub errors: Vec<OperationError>,
    /// Number of operations that succeeded
    pub success_count: usize,
}

impl ApplyOutcome {
    /// Whether every operation succeeded
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of failed operations
    #[inline]
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.errors.len()
    }

    /// One-line summary for a host notification
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} succeeded, {} failed",
            self.success_count,
            self.errors.len()
        )
    }
}
