//! Flow graph processors, delegating to the creation saga

use crate::error::{ProcessorError, RegistryError};
use crate::orchestrator::NodeCreationOrchestrator;
use crate::registry::{Domain, OperationContext, OperationResult, Processor, ProcessorRegistry};
use crate::types::OperationKind;
use patchwork_path::Captures;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum GraphAction {
    CreateNode,
    CreateEdge,
    RemoveNode,
    RemoveEdge,
}

struct GraphProcessor {
    action: GraphAction,
    orchestrator: Arc<NodeCreationOrchestrator>,
}

#[async_trait::async_trait]
impl Processor for GraphProcessor {
    async fn process(&self, ctx: &mut OperationContext<'_>, captures: &Captures) -> OperationResult {
        match self.action {
            GraphAction::CreateNode => {
                ctx.expect_kind(&[OperationKind::Put])?;
                let node = self.orchestrator.create_node(ctx.resource, ctx.value).await?;
                Ok(Some(serde_json::to_value(node)?))
            }
            GraphAction::CreateEdge => {
                ctx.expect_kind(&[OperationKind::Put])?;
                let edge = self.orchestrator.create_edge(ctx.resource, ctx.value).await?;
                Ok(edge.map(serde_json::to_value).transpose()?)
            }
            GraphAction::RemoveNode => {
                ctx.expect_kind(&[OperationKind::Remove])?;
                let node = self.orchestrator.remove_node(ctx.resource, index(captures)?).await?;
                Ok(Some(serde_json::to_value(node)?))
            }
            GraphAction::RemoveEdge => {
                ctx.expect_kind(&[OperationKind::Remove])?;
                let edge = self.orchestrator.remove_edge(ctx.resource, index(captures)?).await?;
                Ok(Some(serde_json::to_value(edge)?))
            }
        }
    }
}

fn index(captures: &Captures) -> Result<usize, ProcessorError> {
    captures
        .index("n")
        .ok_or_else(|| ProcessorError::rejected("missing index"))
}

/// Register `flow.nodes`, `flow.edges` and their indexed removals
pub(crate) fn register(
    registry: &mut ProcessorRegistry,
    orchestrator: &Arc<NodeCreationOrchestrator>,
) -> Result<(), RegistryError> {
    for (template, description, action) in [
        ("flow.nodes", "create a node through the creation saga", GraphAction::CreateNode),
        ("flow.edges", "create an edge unless the pair exists", GraphAction::CreateEdge),
        ("flow.nodes[{n}]", "remove a node and its edges", GraphAction::RemoveNode),
        ("flow.edges[{n}]", "remove an edge", GraphAction::RemoveEdge),
    ] {
        registry.register(
            template,
            description,
            Domain::NodeEdge,
            Arc::new(GraphProcessor {
                action,
                orchestrator: Arc::clone(orchestrator),
            }),
        )?;
    }
    Ok(())
}
