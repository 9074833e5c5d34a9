//! Engine facade
//!
//! Wires configuration, services, the default processor table and the alias
//! table into one [`OperationEngine`].

use crate::alias::AliasTable;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::registry::{Domain, Processor, ProcessorRegistry};
use crate::runner::OperationRunner;
use crate::service::Services;
use crate::types::{ApplyOutcome, Operation};
use serde_json::Value;
use std::sync::Arc;

/// Applies operation batches with the built-in processors
#[derive(Debug, Clone)]
pub struct OperationEngine {
    runner: OperationRunner,
    config: EngineConfig,
}

impl OperationEngine {
    /// Start building an engine
    #[inline]
    #[must_use]
    pub fn builder() -> OperationEngineBuilder {
        OperationEngineBuilder::default()
    }

    /// Apply a batch to a copy of `resource`
    pub async fn apply(&self, resource: &Value, operations: &[Operation]) -> ApplyOutcome {
        self.runner.apply(resource, operations).await
    }

    /// Routing table
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ProcessorRegistry {
        self.runner.registry()
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

struct ExtraProcessor {
    template: String,
    description: String,
    handler: Arc<dyn Processor>,
}

/// Builder for [`OperationEngine`]
#[derive(Default)]
pub struct OperationEngineBuilder {
    config: Option<EngineConfig>,
    services: Option<Services>,
    extra: Vec<ExtraProcessor>,
}

impl OperationEngineBuilder {
    /// With configuration (defaults otherwise)
    #[inline]
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// With service bundle (required)
    #[inline]
    #[must_use]
    pub fn services(mut self, services: Services) -> Self {
        self.services = Some(services);
        self
    }

    /// With an additional processor, registered after the built-in ones
    #[must_use]
    pub fn processor(
        mut self,
        template: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn Processor>,
    ) -> Self {
        self.extra.push(ExtraProcessor {
            template: template.into(),
            description: description.into(),
            handler,
        });
        self
    }

    /// Build the engine
    ///
    /// # Errors
    /// - `EngineError::MissingServices` without a service bundle
    /// - `EngineError::Config` for an invalid configuration
    /// - `EngineError::Registry` if an extra processor collides
    pub fn build(self) -> Result<OperationEngine, EngineError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let services = self.services.ok_or(EngineError::MissingServices)?;

        let mut registry = ProcessorRegistry::with_defaults(&services, &config)?;
        for extra in self.extra {
            registry.register(&extra.template, extra.description, Domain::Custom, extra.handler)?;
        }
        if config.disabled_domains.contains(&Domain::Custom) {
            registry.disable_domain(Domain::Custom);
        }

        tracing::info!(processors = registry.len(), "operation engine ready");
        let runner = OperationRunner::new(Arc::new(registry))
            .with_aliases(AliasTable::legacy_character(&config.personality_separator));
        Ok(OperationEngine { runner, config })
    }
}

impl std::fmt::Debug for OperationEngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationEngineBuilder")
            .field("config", &self.config)
            .field("extra", &self.extra.len())
            .finish_non_exhaustive()
    }
}
