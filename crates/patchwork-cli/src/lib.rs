//! Commands behind the `patchwork` binary
//!
//! Each command seeds in-memory services from the given documents, so the
//! binary stays a thin argument parser and the commands can be driven
//! directly from tests.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

use anyhow::{Context, Result};
use patchwork_cache::{
    flow_key, CacheConfig, FlowFetcher, MokaQueryCache, OptimisticCacheGate, StartNodeBootstrapper,
};
use patchwork_core::memory::InMemoryBackend;
use patchwork_core::{ApplyOutcome, EngineConfig, Operation, OperationEngine};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Configuration from `path`, or defaults when none is given
///
/// # Errors
/// The file cannot be read or holds invalid configuration.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

/// Apply `operations` to `resource`
///
/// A resource carrying a `flow` with an id seeds the flow store, so node and
/// edge edits persist against it.
///
/// # Errors
/// Seeding the flow store or building the engine fails. Failed operations
/// are reported in the outcome, not as an error.
pub async fn apply_batch(
    config: EngineConfig,
    resource: &Value,
    operations: &[Operation],
) -> Result<ApplyOutcome> {
    let backend = InMemoryBackend::new(&config);
    if let Some(flow) = resource.get("flow").filter(|f| f.get("id").is_some()) {
        backend
            .flows
            .insert_flow(flow.clone())
            .context("seeding flow store")?;
    }

    let engine = engine(config, &backend)?;
    let outcome = engine.apply(resource, operations).await;
    tracing::info!(summary = %outcome.summary(), "batch applied");
    Ok(outcome)
}

/// One line per registered path pattern, in routing order
///
/// # Errors
/// Building the engine fails.
pub fn pattern_lines(config: EngineConfig) -> Result<Vec<String>> {
    let backend = InMemoryBackend::new(&config);
    let engine = engine(config, &backend)?;
    Ok(engine
        .registry()
        .entries()
        .iter()
        .map(|entry| {
            let state = if entry.is_enabled() { "" } else { " (disabled)" };
            format!(
                "{:<16} {:<44} {}{}",
                entry.domain().to_string(),
                entry.template(),
                entry.description(),
                state
            )
        })
        .collect())
}

/// Give `document` a start node and return the flow as cached afterwards
///
/// # Errors
/// The document has no id, or the bootstrap mutation fails.
pub async fn bootstrap_flow(config: &EngineConfig, document: Value) -> Result<Value> {
    let flow_id = document
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .context("flow document has no id")?;

    let backend = InMemoryBackend::new(config);
    backend.flows.insert_flow(document).context("seeding flow store")?;

    let cache = Arc::new(MokaQueryCache::with_config(
        Arc::new(FlowFetcher::new(backend.flows.clone())),
        CacheConfig::from(config),
    ));
    let bootstrapper =
        StartNodeBootstrapper::new(OptimisticCacheGate::new(cache.clone()), backend.flows.clone());

    let inserted = bootstrapper.on_flow_created(&flow_id).await?;
    tracing::info!(flow_id = %flow_id, inserted, "bootstrap finished");

    Ok(cache.fetch_query(&flow_key(&flow_id)).await?)
}

/// Read and parse a JSON file
///
/// # Errors
/// The file cannot be read or is not JSON.
pub fn read_json(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Render JSON pretty or on one line
///
/// # Errors
/// Serialization fails.
pub fn render_json(value: &Value, compact: bool) -> Result<String> {
    Ok(if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    })
}

fn engine(config: EngineConfig, backend: &InMemoryBackend) -> Result<OperationEngine> {
    OperationEngine::builder()
        .config(config)
        .services(backend.services())
        .build()
        .context("building engine")
}
