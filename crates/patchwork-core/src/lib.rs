//! Patchwork operation engine
//!
//! Applies ordered batches of path-addressed edit operations to untyped
//! resource documents, routing each one to a domain processor.
//!
//! # Core Concepts
//!
//! - **Operation**: `{path, operation: put|set|remove, value}`
//! - **Processor**: a handler bound to a path pattern that edits one sub-tree
//! - **Registry**: the ordered routing table from patterns to processors
//! - **Runner**: applies a batch to a single clone, recording failures per operation
//! - **Orchestrator**: the multi-service node creation saga
//!
//! # Example
//!
//! ```rust,no_run
//! use patchwork_core::prelude::*;
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), EngineError> {
//! let config = EngineConfig::default();
//! let backend = InMemoryBackend::new(&config);
//! let engine = OperationEngine::builder()
//!     .config(config)
//!     .services(backend.services())
//!     .build()?;
//!
//! let outcome = engine
//!     .apply(
//!         &json!({"plot": {"scenarios": []}}),
//!         &[Operation::put("plot.scenarios.append", json!({"name": "Intro"}))],
//!     )
//!     .await;
//! assert_eq!(outcome.success_count, 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod alias;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod orchestrator;
mod processors;
pub mod registry;
pub mod retry;
pub mod runner;
pub mod service;
pub mod types;

pub use alias::AliasTable;
pub use config::EngineConfig;
pub use engine::{OperationEngine, OperationEngineBuilder};
pub use error::{
    ConfigError, EngineError, ErrorContext, ErrorKind, OperationError, ProcessorError,
    RegistryError, ServiceError, ServiceResult,
};
pub use orchestrator::{NodeCreationOrchestrator, SagaStep};
pub use registry::{
    Domain, FnProcessor, OperationContext, OperationResult, Processor, ProcessorEntry,
    ProcessorRegistry,
};
pub use retry::{Backoff, RetryExhausted, RetryPolicy};
pub use runner::OperationRunner;
pub use service::{
    AgentService, ColorAssigner, DataStoreNodeService, FlowService, IfNodeService,
    NodeEdgeNotifier, Services,
};
pub use types::{
    AgentRecord, ApplyOutcome, EdgeDescriptor, NodeCreateRequest, NodeDescriptor, NodeType,
    Operation, OperationKind, Position, Resource, ServiceEntity,
};

/// Common imports
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::engine::OperationEngine;
    pub use crate::error::{EngineError, ErrorKind, OperationError, ProcessorError};
    pub use crate::memory::InMemoryBackend;
    pub use crate::registry::{Domain, OperationContext, OperationResult, Processor};
    pub use crate::service::Services;
    pub use crate::types::{ApplyOutcome, Operation, OperationKind};
    pub use patchwork_path::{Captures, OperationPath, PathPattern};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
