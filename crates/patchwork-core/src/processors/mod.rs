//! Built-in domain processors
//!
//! Groups are registered in this order: character, plot, common, agent,
//! flow, node/edge, data-store node, if-node. Within a group, entry
//! collections come before the catch-all `<root>.{field}` template, which
//! only wins where nothing more specific matches.

mod collection;
pub(crate) mod doc;
mod entries;
mod flow;
mod graph;
mod if_node;
mod json;
mod scalar;

pub(crate) use flow::flow_id;

use crate::config::EngineConfig;
use crate::error::RegistryError;
use crate::orchestrator::NodeCreationOrchestrator;
use crate::registry::{Domain, ProcessorRegistry};
use crate::service::Services;
use entries::{
    DataStoreNodeField, IfCondition, LorebookEntry, OutputField, PromptMessage, Scenario,
};
use scalar::{ScalarFields, AGENT_FIELDS, CHARACTER_FIELDS, COMMON_FIELDS, PLOT_FIELDS};
use std::sync::Arc;

fn character(registry: &mut ProcessorRegistry, limit: usize) -> Result<(), RegistryError> {
    collection::register::<LorebookEntry>(registry, Domain::Character, "character.lorebook.entries", limit)?;
    ScalarFields::new("character", CHARACTER_FIELDS).register(registry, Domain::Character)
}

fn plot(registry: &mut ProcessorRegistry, limit: usize) -> Result<(), RegistryError> {
    collection::register::<Scenario>(registry, Domain::Plot, "plot.scenarios", limit)?;
    collection::register::<LorebookEntry>(registry, Domain::Plot, "plot.lorebook.entries", limit)?;
    ScalarFields::new("plot", PLOT_FIELDS).register(registry, Domain::Plot)
}

fn common(registry: &mut ProcessorRegistry) -> Result<(), RegistryError> {
    ScalarFields::new("common", COMMON_FIELDS).register(registry, Domain::Common)
}

fn agent(registry: &mut ProcessorRegistry, limit: usize) -> Result<(), RegistryError> {
    collection::register::<PromptMessage>(registry, Domain::Agent, "agent.prompt_messages", limit)?;
    collection::register::<OutputField>(registry, Domain::Agent, "agent.output_fields", limit)?;
    ScalarFields::new("agent", AGENT_FIELDS).register(registry, Domain::Agent)
}

fn data_store_node(registry: &mut ProcessorRegistry, limit: usize) -> Result<(), RegistryError> {
    collection::register::<DataStoreNodeField>(registry, Domain::DataStoreNode, "data_store_node.fields", limit)
}

fn if_node(registry: &mut ProcessorRegistry, limit: usize) -> Result<(), RegistryError> {
    collection::register::<IfCondition>(registry, Domain::IfNode, "if_node.conditions", limit)?;
    registry.register_fn(
        "if_node.logic_operator",
        "set how conditions combine (AND/OR)",
        Domain::IfNode,
        if_node::set_logic_operator,
    )
}

impl ProcessorRegistry {
    /// Registry with every built-in domain processor
    ///
    /// Domains listed in `config.disabled_domains` are registered but
    /// skipped during routing.
    ///
    /// # Errors
    /// `RegistryError` if a built-in template collides, which indicates a
    /// programming error rather than bad input.
    pub fn with_defaults(services: &Services, config: &EngineConfig) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        let orchestrator = Arc::new(NodeCreationOrchestrator::from_config(services.clone(), config));

        let limit = config.max_auto_extend;

        character(&mut registry, limit)?;
        plot(&mut registry, limit)?;
        common(&mut registry)?;
        agent(&mut registry, limit)?;
        flow::register(&mut registry, &services.flows, limit)?;
        graph::register(&mut registry, &orchestrator)?;
        data_store_node(&mut registry, limit)?;
        if_node(&mut registry, limit)?;

        for domain in &config.disabled_domains {
            registry.disable_domain(*domain);
        }

        tracing::debug!(entries = registry.len(), "default processors registered");
        Ok(registry)
    }
}
