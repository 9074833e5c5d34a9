//! Processor registry
//!
//! Provides [`ProcessorRegistry`], the ordered table of `(pattern, handler)`
//! pairs that routes an operation path to exactly one processor.
//!
//! # Resolution
//! - Every enabled entry whose pattern matches the path is a candidate
//! - The candidate with the highest [`Specificity`] wins
//! - Equal specificity falls back to registration order (first wins)
//!
//! Registering a pattern with the same shape as an existing one is refused,
//! so two entries can never tie on the same paths.

use crate::error::{ProcessorError, RegistryError};
use crate::types::OperationKind;
use patchwork_path::{Captures, OperationPath, PathPattern, Specificity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// What a processor returns: an optional result payload or an error
pub type OperationResult = Result<Option<Value>, ProcessorError>;

/// Processor groups, in default registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Character card fields and lorebook
    Character,
    /// Plot card fields, scenarios and lorebook
    Plot,
    /// Fields shared by every card
    Common,
    /// Agent prompt and output schema
    Agent,
    /// Flow name, response template, data-store schema
    Flow,
    /// Flow graph nodes and edges
    NodeEdge,
    /// Data-store node field logic
    DataStoreNode,
    /// If-node conditions
    IfNode,
    /// Registered by the host
    Custom,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Character => "character",
            Self::Plot => "plot",
            Self::Common => "common",
            Self::Agent => "agent",
            Self::Flow => "flow",
            Self::NodeEdge => "node_edge",
            Self::DataStoreNode => "data_store_node",
            Self::IfNode => "if_node",
            Self::Custom => "custom",
        })
    }
}

/// Everything a processor sees for one operation
#[derive(Debug)]
pub struct OperationContext<'a> {
    /// Position in the batch
    pub index: usize,
    /// Normalized (post-alias) path
    pub path: &'a OperationPath,
    /// Operation kind
    pub operation: OperationKind,
    /// Operation payload
    pub value: &'a Value,
    /// The batch's working copy
    pub resource: &'a mut Value,
}

impl OperationContext<'_> {
    /// Reject unless the operation kind is one of `allowed`
    ///
    /// # Errors
    /// `ProcessorError::Rejected` naming the path and kind.
    pub fn expect_kind(&self, allowed: &[OperationKind]) -> Result<(), ProcessorError> {
        if allowed.contains(&self.operation) {
            Ok(())
        } else {
            Err(ProcessorError::rejected(format!(
                "operation '{}' is not supported on '{}'",
                self.operation, self.path
            )))
        }
    }
}

/// A handler bound to one pattern
///
/// Processors mutate `ctx.resource` in place. A processor that returns
/// `ProcessorError::Rejected` must leave the resource untouched.
#[async_trait::async_trait]
pub trait Processor: Send + Sync {
    /// Apply one operation
    async fn process(&self, ctx: &mut OperationContext<'_>, captures: &Captures) -> OperationResult;
}

/// Adapter turning a synchronous closure into a [`Processor`]
pub struct FnProcessor<F>(F);

impl<F> FnProcessor<F>
where
    F: Fn(&mut OperationContext<'_>, &Captures) -> OperationResult + Send + Sync,
{
    /// Wrap closure
    #[inline]
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait::async_trait]
impl<F> Processor for FnProcessor<F>
where
    F: Fn(&mut OperationContext<'_>, &Captures) -> OperationResult + Send + Sync,
{
    async fn process(&self, ctx: &mut OperationContext<'_>, captures: &Captures) -> OperationResult {
        (self.0)(ctx, captures)
    }
}

/// One row of the routing table
#[derive(Clone)]
pub struct ProcessorEntry {
    pattern: PathPattern,
    description: String,
    domain: Domain,
    handler: Arc<dyn Processor>,
    enabled: bool,
}

impl ProcessorEntry {
    /// Compiled pattern
    #[inline]
    #[must_use]
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Source template
    #[inline]
    #[must_use]
    pub fn template(&self) -> &str {
        self.pattern.template()
    }

    /// Human-readable description
    #[inline]
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Owning domain
    #[inline]
    #[must_use]
    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Handler
    #[inline]
    #[must_use]
    pub fn handler(&self) -> &Arc<dyn Processor> {
        &self.handler
    }

    /// Whether routing may select this entry
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl fmt::Debug for ProcessorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorEntry")
            .field("template", &self.pattern.template())
            .field("domain", &self.domain)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Ordered routing table
#[derive(Debug, Default, Clone)]
pub struct ProcessorRegistry {
    entries: Vec<ProcessorEntry>,
}

impl ProcessorRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register a processor under a template
    ///
    /// # Errors
    /// - `RegistryError::InvalidPattern` if the template does not compile
    /// - `RegistryError::DuplicatePattern` if an entry with the same shape exists
    pub fn register(
        &mut self,
        template: &str,
        description: impl Into<String>,
        domain: Domain,
        handler: Arc<dyn Processor>,
    ) -> Result<(), RegistryError> {
        let pattern = PathPattern::compile(template)?;
        let shape = pattern.shape();

        if let Some(existing) = self.entries.iter().find(|e| e.pattern.shape() == shape) {
            return Err(RegistryError::DuplicatePattern {
                template: pattern.template().to_string(),
                existing: existing.template().to_string(),
            });
        }

        self.entries.push(ProcessorEntry {
            pattern,
            description: description.into(),
            domain,
            handler,
            enabled: true,
        });
        Ok(())
    }

    /// Register a synchronous closure
    ///
    /// # Errors
    /// As [`ProcessorRegistry::register`].
    pub fn register_fn<F>(
        &mut self,
        template: &str,
        description: impl Into<String>,
        domain: Domain,
        f: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&mut OperationContext<'_>, &Captures) -> OperationResult + Send + Sync + 'static,
    {
        self.register(template, description, domain, Arc::new(FnProcessor::new(f)))
    }

    /// Exclude every entry of `domain` from routing
    pub fn disable_domain(&mut self, domain: Domain) {
        for entry in self.entries.iter_mut().filter(|e| e.domain == domain) {
            entry.enabled = false;
        }
    }

    /// Resolve the processor for a path
    #[must_use]
    pub fn find(&self, path: &OperationPath) -> Option<(&ProcessorEntry, Captures)> {
        let mut best: Option<(&ProcessorEntry, Captures, Specificity)> = None;

        for entry in self.entries.iter().filter(|e| e.enabled) {
            let Some(captures) = entry.pattern.captures(path) else {
                continue;
            };
            let specificity = entry.pattern.specificity();
            let better = best
                .as_ref()
                .map_or(true, |(_, _, current)| specificity > *current);
            if better {
                best = Some((entry, captures, specificity));
            }
        }

        best.map(|(entry, captures, _)| (entry, captures))
    }

    /// All entries in registration order
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[ProcessorEntry] {
        &self.entries
    }

    /// Entries of one domain
    pub fn domain_entries(&self, domain: Domain) -> impl Iterator<Item = &ProcessorEntry> {
        self.entries.iter().filter(move |e| e.domain == domain)
    }

    /// Get number of registered entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tag(label: &'static str) -> Arc<dyn Processor> {
        Arc::new(FnProcessor::new(move |_ctx: &mut OperationContext<'_>, _caps: &Captures| {
            Ok(Some(json!(label)))
        }))
    }

    fn path(raw: &str) -> OperationPath {
        OperationPath::parse(raw).unwrap()
    }

    #[test]
    fn registry_new_empty() {
        let registry = ProcessorRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.find(&path("character.name")).is_none());
    }

    #[test]
    fn find_returns_captures() {
        let mut registry = ProcessorRegistry::new();
        registry
            .register("plot.scenarios[{n}].{field}", "scenario field", Domain::Plot, tag("field"))
            .unwrap();

        let (entry, caps) = registry.find(&path("plot.scenarios[1].name")).unwrap();
        assert_eq!(entry.template(), "plot.scenarios[{n}].{field}");
        assert_eq!(entry.domain(), Domain::Plot);
        assert_eq!(caps.index("n"), Some(1));
        assert_eq!(caps.field("field"), Some("name"));
    }

    #[test]
    fn specific_pattern_beats_earlier_broad_one() {
        let mut registry = ProcessorRegistry::new();
        registry
            .register("character.{field}", "any field", Domain::Character, tag("broad"))
            .unwrap();
        registry
            .register("character.name", "name only", Domain::Custom, tag("exact"))
            .unwrap();

        let (entry, _) = registry.find(&path("character.name")).unwrap();
        assert_eq!(entry.template(), "character.name");

        let (entry, _) = registry.find(&path("character.description")).unwrap();
        assert_eq!(entry.template(), "character.{field}");
    }

    #[test]
    fn leftmost_specific_segment_decides() {
        let mut registry = ProcessorRegistry::new();
        registry
            .register("a.{x}.b", "first", Domain::Custom, tag("first"))
            .unwrap();
        registry
            .register("a.b.{y}", "second", Domain::Custom, tag("second"))
            .unwrap();

        let (entry, _) = registry.find(&path("a.b.b")).unwrap();
        assert_eq!(entry.template(), "a.b.{y}");

        let (entry, _) = registry.find(&path("a.c.b")).unwrap();
        assert_eq!(entry.template(), "a.{x}.b");
    }

    #[test]
    fn index_placeholder_beats_field_placeholder() {
        let mut registry = ProcessorRegistry::new();
        registry
            .register("plot.{field}", "field", Domain::Plot, tag("field"))
            .unwrap();
        registry
            .register("plot[{n}]", "index", Domain::Custom, tag("index"))
            .unwrap();

        let (entry, caps) = registry.find(&path("plot[3]")).unwrap();
        assert_eq!(entry.template(), "plot[{n}]");
        assert_eq!(caps.index("n"), Some(3));

        let (entry, _) = registry.find(&path("plot.name")).unwrap();
        assert_eq!(entry.template(), "plot.{field}");
    }

    #[test]
    fn duplicate_shape_is_rejected() {
        let mut registry = ProcessorRegistry::new();
        registry
            .register("plot.scenarios[{n}]", "indexed", Domain::Plot, tag("a"))
            .unwrap();
        let err = registry
            .register("plot.scenarios[{i}]", "indexed again", Domain::Custom, tag("b"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicatePattern { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn invalid_template_is_rejected() {
        let mut registry = ProcessorRegistry::new();
        let err = registry
            .register("plot..x", "broken", Domain::Plot, tag("a"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidPattern(_)));
    }

    #[test]
    fn disabled_domain_is_skipped() {
        let mut registry = ProcessorRegistry::new();
        registry
            .register("if_node.logic_operator", "operator", Domain::IfNode, tag("a"))
            .unwrap();
        registry.disable_domain(Domain::IfNode);

        assert!(registry.find(&path("if_node.logic_operator")).is_none());
        assert!(!registry.entries()[0].is_enabled());
    }

    #[tokio::test]
    async fn fn_processor_runs_closure() {
        let mut registry = ProcessorRegistry::new();
        registry
            .register_fn("common.title", "title", Domain::Common, |ctx, _caps| {
                ctx.expect_kind(&[OperationKind::Set])?;
                ctx.resource["common"] = json!({"title": ctx.value.clone()});
                Ok(None)
            })
            .unwrap();

        let target = path("common.title");
        let (entry, caps) = registry.find(&target).unwrap();
        let mut resource = json!({});
        let value = json!("Tavern");
        let mut ctx = OperationContext {
            index: 0,
            path: &target,
            operation: OperationKind::Set,
            value: &value,
            resource: &mut resource,
        };
        entry.handler().process(&mut ctx, &caps).await.unwrap();
        assert_eq!(resource, json!({"common": {"title": "Tavern"}}));
    }

    #[test]
    fn expect_kind_rejects_other_kinds() {
        let target = path("plot.scenarios.append");
        let value = Value::Null;
        let mut resource = json!({});
        let ctx = OperationContext {
            index: 0,
            path: &target,
            operation: OperationKind::Set,
            value: &value,
            resource: &mut resource,
        };
        let err = ctx.expect_kind(&[OperationKind::Put]).unwrap_err();
        assert!(err.to_string().contains("'set' is not supported"));
    }
}
