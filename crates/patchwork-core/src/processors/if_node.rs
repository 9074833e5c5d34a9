//! If-node logic operator

use super::doc::object_at;
use super::entries::kind_of;
use crate::error::ProcessorError;
use crate::registry::{OperationContext, OperationResult};
use crate::types::OperationKind;
use patchwork_path::Captures;
use serde_json::{json, Value};

/// Operators joining an if-node's conditions
pub(crate) const LOGIC_OPERATORS: &[&str] = &["AND", "OR"];

/// `set if_node.logic_operator`
pub(crate) fn set_logic_operator(ctx: &mut OperationContext<'_>, _captures: &Captures) -> OperationResult {
    ctx.expect_kind(&[OperationKind::Set])?;
    let operator = match ctx.value {
        Value::String(raw) => raw.trim().to_ascii_uppercase(),
        other => {
            return Err(ProcessorError::rejected(format!(
                "logic operator must be text, got {}",
                kind_of(other)
            )))
        }
    };
    if !LOGIC_OPERATORS.contains(&operator.as_str()) {
        return Err(ProcessorError::rejected(format!(
            "logic operator must be one of {}, got '{operator}'",
            LOGIC_OPERATORS.join(", ")
        )));
    }

    object_at(ctx.resource, &["if_node"])?.insert("logic_operator".to_string(), json!(operator));
    Ok(Some(json!(operator)))
}
