//! Optimistic cache for flow documents
//!
//! Latency-sensitive edits (such as giving a new flow its start node) update
//! the client-side cache first and reconcile with persisted state after the
//! real mutation settles.
//!
//! # Example
//!
//! ```rust,no_run
//! use patchwork_cache::{FlowFetcher, MokaQueryCache, OptimisticCacheGate, StartNodeBootstrapper};
//! use patchwork_core::memory::InMemoryFlowStore;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), patchwork_cache::CacheError> {
//! let flows = Arc::new(InMemoryFlowStore::new());
//! let cache = Arc::new(MokaQueryCache::new(Arc::new(FlowFetcher::new(flows.clone()))));
//! let bootstrapper = StartNodeBootstrapper::new(OptimisticCacheGate::new(cache), flows);
//! bootstrapper.on_flow_created("flow-1").await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod gate;
pub mod lifecycle;
pub mod query;

pub use error::CacheError;
pub use gate::OptimisticCacheGate;
pub use lifecycle::{flow_key, FlowFetcher, StartNodeBootstrapper};
pub use query::{CacheConfig, MokaQueryCache, QueryCache, QueryFetcher, QueryUpdater};
