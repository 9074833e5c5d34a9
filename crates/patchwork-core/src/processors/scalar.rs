//! Top-level scalar fields of a domain root (`character.name`, `agent.temperature`)

use super::doc::object_at;
use super::entries::kind_of;
use super::json::accepted_value;
use crate::error::{ProcessorError, RegistryError};
use crate::registry::{Domain, OperationContext, OperationResult, Processor, ProcessorRegistry};
use crate::types::OperationKind;
use patchwork_path::Captures;
use serde_json::Value;
use std::sync::Arc;

/// Accepted value kind of a scalar field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldKind {
    Text,
    TextList,
    Number,
    Flag,
}

impl FieldKind {
    fn check(self, value: &Value) -> Result<(), String> {
        let ok = match self {
            Self::Text => value.is_string(),
            Self::TextList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            Self::Number => value.is_number(),
            Self::Flag => value.is_boolean(),
        };
        if ok {
            Ok(())
        } else {
            Err(format!("expected {}, got {}", self.expected(), kind_of(value)))
        }
    }

    fn expected(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::TextList => "a list of text",
            Self::Number => "a number",
            Self::Flag => "a boolean",
        }
    }
}

pub(crate) const CHARACTER_FIELDS: &[(&str, FieldKind)] = &[
    ("name", FieldKind::Text),
    ("description", FieldKind::Text),
    ("example_dialogue", FieldKind::Text),
    ("tags", FieldKind::TextList),
    ("creator_notes", FieldKind::Text),
    ("version", FieldKind::Text),
];

pub(crate) const PLOT_FIELDS: &[(&str, FieldKind)] = &[
    ("name", FieldKind::Text),
    ("description", FieldKind::Text),
    ("tags", FieldKind::TextList),
];

pub(crate) const COMMON_FIELDS: &[(&str, FieldKind)] = &[
    ("title", FieldKind::Text),
    ("summary", FieldKind::Text),
    ("tags", FieldKind::TextList),
    ("version", FieldKind::Text),
    ("creator", FieldKind::Text),
    ("conceptual_origin", FieldKind::Text),
];

pub(crate) const AGENT_FIELDS: &[(&str, FieldKind)] = &[
    ("name", FieldKind::Text),
    ("description", FieldKind::Text),
    ("model", FieldKind::Text),
    ("temperature", FieldKind::Number),
    ("output_format", FieldKind::Text),
    ("enabled", FieldKind::Flag),
];

/// `set`/`remove` on `<root>.{field}` restricted to an allow-list
pub(crate) struct ScalarFields {
    root: &'static str,
    fields: &'static [(&'static str, FieldKind)],
}

impl ScalarFields {
    pub(crate) const fn new(root: &'static str, fields: &'static [(&'static str, FieldKind)]) -> Self {
        Self { root, fields }
    }

    fn kind_of_field(&self, field: &str) -> Result<FieldKind, ProcessorError> {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| {
                ProcessorError::rejected(format!("unknown {} field '{field}'", self.root))
            })
    }

    /// Register under `<root>.{field}`
    pub(crate) fn register(self, registry: &mut ProcessorRegistry, domain: Domain) -> Result<(), RegistryError> {
        let template = format!("{}.{{field}}", self.root);
        let description = format!(
            "set or remove a {} field ({})",
            self.root,
            self.fields
                .iter()
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
                .join(", ")
        );
        registry.register(&template, description, domain, Arc::new(self))
    }
}

#[async_trait::async_trait]
impl Processor for ScalarFields {
    async fn process(&self, ctx: &mut OperationContext<'_>, captures: &Captures) -> OperationResult {
        ctx.expect_kind(&[OperationKind::Set, OperationKind::Remove])?;
        let field = captures
            .field("field")
            .ok_or_else(|| ProcessorError::rejected("missing field name"))?;
        let kind = self.kind_of_field(field)?;

        if ctx.operation == OperationKind::Remove {
            return Ok(ctx
                .resource
                .get_mut(self.root)
                .and_then(Value::as_object_mut)
                .and_then(|root| root.remove(field)));
        }

        let accepted = accepted_value(ctx.value, |v| kind.check(v))
            .map_err(|reason| ProcessorError::rejected(format!("{}.{field}: {reason}", self.root)))?;
        object_at(ctx.resource, &[self.root])?.insert(field.to_string(), accepted.clone());
        Ok(Some(accepted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchwork_path::{OperationPath, PathPattern};
    use serde_json::json;

    async fn run(
        fields: &ScalarFields,
        resource: &mut Value,
        path: &str,
        operation: OperationKind,
        value: Value,
    ) -> OperationResult {
        let template = format!("{}.{{field}}", fields.root);
        let path = OperationPath::parse(path).unwrap();
        let caps = PathPattern::compile(&template).unwrap().captures(&path).unwrap();
        let mut ctx = OperationContext {
            index: 0,
            path: &path,
            operation,
            value: &value,
            resource,
        };
        fields.process(&mut ctx, &caps).await
    }

    #[tokio::test]
    async fn set_creates_root() {
        let fields = ScalarFields::new("character", CHARACTER_FIELDS);
        let mut doc = json!({});
        run(&fields, &mut doc, "character.example_dialogue", OperationKind::Set, json!("Hi"))
            .await
            .unwrap();
        assert_eq!(doc, json!({"character": {"example_dialogue": "Hi"}}));
    }

    #[tokio::test]
    async fn set_parses_tag_list() {
        let fields = ScalarFields::new("plot", PLOT_FIELDS);
        let mut doc = json!({"plot": {}});
        run(&fields, &mut doc, "plot.tags", OperationKind::Set, json!("[\"noir\", \"heist\"]"))
            .await
            .unwrap();
        assert_eq!(doc["plot"]["tags"], json!(["noir", "heist"]));
    }

    #[tokio::test]
    async fn malformed_json_list_is_stored_raw() {
        let fields = ScalarFields::new("plot", PLOT_FIELDS);
        let mut doc = json!({"plot": {}});
        let stored = run(&fields, &mut doc, "plot.tags", OperationKind::Set, json!("[noir, heist}"))
            .await
            .unwrap();
        assert_eq!(stored, Some(json!("[noir, heist}")));
        assert_eq!(doc["plot"]["tags"], "[noir, heist}");
    }

    #[tokio::test]
    async fn rejects_field_outside_allow_list() {
        let fields = ScalarFields::new("common", COMMON_FIELDS);
        let mut doc = json!({});
        let err = run(&fields, &mut doc, "common.secret", OperationKind::Set, json!("x"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown common field 'secret'");
        assert_eq!(doc, json!({}));
    }

    #[tokio::test]
    async fn rejects_wrong_kind() {
        let fields = ScalarFields::new("agent", AGENT_FIELDS);
        let mut doc = json!({});
        let err = run(&fields, &mut doc, "agent.temperature", OperationKind::Set, json!("warm"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "agent.temperature: expected a number, got a string");

        let err = run(&fields, &mut doc, "agent.enabled", OperationKind::Set, json!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Rejected(_)));
        assert_eq!(doc, json!({}));
    }

    #[tokio::test]
    async fn remove_drops_field() {
        let fields = ScalarFields::new("agent", AGENT_FIELDS);
        let mut doc = json!({"agent": {"model": "m1", "name": "Critic"}});
        let removed = run(&fields, &mut doc, "agent.model", OperationKind::Remove, Value::Null)
            .await
            .unwrap();
        assert_eq!(removed, Some(json!("m1")));
        assert_eq!(doc, json!({"agent": {"name": "Critic"}}));
    }

    #[tokio::test]
    async fn put_is_not_supported() {
        let fields = ScalarFields::new("plot", PLOT_FIELDS);
        let mut doc = json!({});
        let err = run(&fields, &mut doc, "plot.name", OperationKind::Put, json!("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Rejected(_)));
    }
}
