//! Persisted flow fields
//!
//! Unlike card fields, these go through the flow service first; the working
//! copy is updated only after the service accepted the change.

use super::collection::{EntryCollection, Shape};
use super::doc::{object_at, str_at, value_at};
use super::entries::{kind_of, DataStoreField};
use crate::error::{ProcessorError, RegistryError};
use crate::registry::{Domain, OperationContext, OperationResult, Processor, ProcessorRegistry};
use crate::service::FlowService;
use crate::types::OperationKind;
use patchwork_path::Captures;
use serde_json::{json, Value};
use std::sync::Arc;

/// Id of the flow being edited
pub(crate) fn flow_id(resource: &Value) -> Result<String, ProcessorError> {
    str_at(resource, &["flow", "id"])
        .map(str::to_string)
        .ok_or_else(|| ProcessorError::rejected("resource has no flow id"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowField {
    Name,
    ResponseTemplate,
}

impl FlowField {
    fn key(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::ResponseTemplate => "response_template",
        }
    }
}

struct FlowFieldProcessor {
    field: FlowField,
    flows: Arc<dyn FlowService>,
}

#[async_trait::async_trait]
impl Processor for FlowFieldProcessor {
    async fn process(&self, ctx: &mut OperationContext<'_>, _captures: &Captures) -> OperationResult {
        ctx.expect_kind(&[OperationKind::Set])?;
        let Some(text) = ctx.value.as_str() else {
            return Err(ProcessorError::rejected(format!(
                "flow.{}: expected text, got {}",
                self.field.key(),
                kind_of(ctx.value)
            )));
        };
        let id = flow_id(ctx.resource)?;

        match self.field {
            FlowField::Name => self
                .flows
                .update_flow_name(&id, text)
                .await
                .map_err(|e| ProcessorError::service("update_flow_name", e))?,
            FlowField::ResponseTemplate => self
                .flows
                .update_response_template(&id, text)
                .await
                .map_err(|e| ProcessorError::service("update_response_template", e))?,
        }

        tracing::debug!(flow_id = %id, field = self.field.key(), "flow field persisted");
        object_at(ctx.resource, &["flow"])?.insert(self.field.key().to_string(), json!(text));
        Ok(Some(json!(text)))
    }
}

/// `flow.data_store_schema.fields.*`, persisted as a whole schema
struct SchemaFieldsProcessor {
    shape: Shape,
    fields: EntryCollection<DataStoreField>,
    flows: Arc<dyn FlowService>,
}

#[async_trait::async_trait]
impl Processor for SchemaFieldsProcessor {
    async fn process(&self, ctx: &mut OperationContext<'_>, captures: &Captures) -> OperationResult {
        let id = flow_id(ctx.resource)?;
        let mut schema = value_at(ctx.resource, &["flow", "data_store_schema"])
            .filter(|schema| !schema.is_null())
            .cloned()
            .unwrap_or_else(|| json!({"fields": []}));

        let result = self
            .fields
            .apply(&mut schema, self.shape, ctx.operation, ctx.value, captures)?;

        self.flows
            .update_data_store_schema(&id, &schema)
            .await
            .map_err(|e| ProcessorError::service("update_data_store_schema", e))?;

        tracing::debug!(flow_id = %id, "data-store schema persisted");
        object_at(ctx.resource, &["flow"])?.insert("data_store_schema".to_string(), schema);
        Ok(result)
    }
}

/// Register flow name, response template and schema field processors
pub(crate) fn register(
    registry: &mut ProcessorRegistry,
    flows: &Arc<dyn FlowService>,
    max_auto_extend: usize,
) -> Result<(), RegistryError> {
    for (field, description) in [
        (FlowField::Name, "rename the flow"),
        (FlowField::ResponseTemplate, "replace the flow response template"),
    ] {
        registry.register(
            &format!("flow.{}", field.key()),
            description,
            Domain::Flow,
            Arc::new(FlowFieldProcessor {
                field,
                flows: Arc::clone(flows),
            }),
        )?;
    }

    for shape in Shape::ALL {
        let description = match shape {
            Shape::Append => "append a data-store schema field",
            Shape::Indexed => "replace or remove a data-store schema field by index",
            Shape::Field => "set one property of a data-store schema field",
        };
        registry.register(
            &shape.template("flow.data_store_schema.fields"),
            description,
            Domain::Flow,
            Arc::new(SchemaFieldsProcessor {
                shape,
                fields: EntryCollection::at("fields").with_max_auto_extend(max_auto_extend),
                flows: Arc::clone(flows),
            }),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::service::MockFlowService;
    use patchwork_path::{OperationPath, PathPattern};

    async fn run(
        processor: &dyn Processor,
        template: &str,
        resource: &mut Value,
        path: &str,
        operation: OperationKind,
        value: Value,
    ) -> OperationResult {
        let path = OperationPath::parse(path).unwrap();
        let caps = PathPattern::compile(template).unwrap().captures(&path).unwrap();
        let mut ctx = OperationContext {
            index: 0,
            path: &path,
            operation,
            value: &value,
            resource,
        };
        processor.process(&mut ctx, &caps).await
    }

    #[tokio::test]
    async fn name_is_persisted_then_applied() {
        let mut flows = MockFlowService::new();
        flows
            .expect_update_flow_name()
            .withf(|id, name| id == "f1" && name == "Router")
            .times(1)
            .returning(|_, _| Ok(()));
        let processor = FlowFieldProcessor {
            field: FlowField::Name,
            flows: Arc::new(flows),
        };

        let mut doc = json!({"flow": {"id": "f1", "name": "Old"}});
        run(&processor, "flow.name", &mut doc, "flow.name", OperationKind::Set, json!("Router"))
            .await
            .unwrap();
        assert_eq!(doc["flow"]["name"], "Router");
    }

    #[tokio::test]
    async fn service_failure_leaves_resource_unchanged() {
        let mut flows = MockFlowService::new();
        flows
            .expect_update_response_template()
            .returning(|_, _| Err(ServiceError::Unavailable("offline".into())));
        let processor = FlowFieldProcessor {
            field: FlowField::ResponseTemplate,
            flows: Arc::new(flows),
        };

        let mut doc = json!({"flow": {"id": "f1", "response_template": "{{a}}"}});
        let err = run(
            &processor,
            "flow.response_template",
            &mut doc,
            "flow.response_template",
            OperationKind::Set,
            json!("{{b}}"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ServiceCallFailure);
        assert_eq!(doc["flow"]["response_template"], "{{a}}");
    }

    #[tokio::test]
    async fn missing_flow_id_is_rejected_without_calls() {
        let processor = FlowFieldProcessor {
            field: FlowField::Name,
            flows: Arc::new(MockFlowService::new()),
        };
        let mut doc = json!({"flow": {}});
        let err = run(&processor, "flow.name", &mut doc, "flow.name", OperationKind::Set, json!("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Rejected(_)));
    }

    #[tokio::test]
    async fn schema_field_append_persists_whole_schema() {
        let mut flows = MockFlowService::new();
        flows
            .expect_update_data_store_schema()
            .withf(|id, schema| id == "f1" && schema["fields"][0]["name"] == "mood")
            .times(1)
            .returning(|_, _| Ok(()));
        let processor = SchemaFieldsProcessor {
            shape: Shape::Append,
            fields: EntryCollection::at("fields"),
            flows: Arc::new(flows),
        };

        let mut doc = json!({"flow": {"id": "f1"}});
        run(
            &processor,
            "flow.data_store_schema.fields.append",
            &mut doc,
            "flow.data_store_schema.fields.append",
            OperationKind::Put,
            json!({"name": "mood"}),
        )
        .await
        .unwrap();

        let field = &doc["flow"]["data_store_schema"]["fields"][0];
        assert_eq!(field["name"], "mood");
        assert_eq!(field["type"], "string");
    }

    #[tokio::test]
    async fn schema_rejection_skips_service() {
        let processor = SchemaFieldsProcessor {
            shape: Shape::Field,
            fields: EntryCollection::at("fields"),
            flows: Arc::new(MockFlowService::new()),
        };
        let mut doc = json!({"flow": {"id": "f1"}});
        let err = run(
            &processor,
            "flow.data_store_schema.fields[{n}].{field}",
            &mut doc,
            "flow.data_store_schema.fields[0].color",
            OperationKind::Set,
            json!("red"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProcessorError::Rejected(_)));
        assert_eq!(doc, json!({"flow": {"id": "f1"}}));
    }
}
