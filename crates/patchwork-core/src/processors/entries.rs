//! Entry shapes stored in resource arrays
//!
//! Every shape has a default form. Partial input is merged over the default;
//! unknown fields and type mismatches are rejected.

use crate::error::ProcessorError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A typed array entry with a default form
pub(crate) trait EntryShape: Serialize + DeserializeOwned + Default {
    /// Name used in rejection messages
    const LABEL: &'static str;

    /// Default entry as a document
    fn default_value() -> Result<Value, ProcessorError> {
        Ok(serde_json::to_value(Self::default())?)
    }

    /// Merge partial input over the default entry
    fn normalize(input: &Value) -> Result<Value, ProcessorError> {
        let entry: Self = match input {
            Value::Null => Self::default(),
            Value::Object(_) => serde_json::from_value(input.clone()).map_err(|err| {
                ProcessorError::rejected(format!("invalid {}: {err}", Self::LABEL))
            })?,
            other => {
                return Err(ProcessorError::rejected(format!(
                    "invalid {}: expected an object, got {}",
                    Self::LABEL,
                    kind_of(other)
                )))
            }
        };
        Ok(serde_json::to_value(entry)?)
    }

    /// Check that `field` may hold `value`
    fn check_field(field: &str, value: &Value) -> Result<(), String> {
        let mut probe = serde_json::to_value(Self::default()).map_err(|err| err.to_string())?;
        let Some(slots) = probe.as_object_mut() else {
            return Err(format!("{} has no fields", Self::LABEL));
        };
        if !slots.contains_key(field) {
            return Err(format!("unknown {} field '{field}'", Self::LABEL));
        }
        slots.insert(field.to_string(), value.clone());
        serde_json::from_value::<Self>(probe)
            .map(|_| ())
            .map_err(|err| format!("invalid {} field '{field}': {err}", Self::LABEL))
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Plot scenario
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Scenario {
    name: String,
    description: String,
}

impl EntryShape for Scenario {
    const LABEL: &'static str = "scenario";
}

/// Lorebook entry shared by characters and plots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct LorebookEntry {
    id: String,
    name: String,
    enabled: bool,
    keys: Vec<String>,
    content: String,
    recall_range: u32,
}

impl Default for LorebookEntry {
    fn default() -> Self {
        Self {
            id: new_id(),
            name: String::new(),
            enabled: true,
            keys: Vec::new(),
            content: String::new(),
            recall_range: 1000,
        }
    }
}

impl EntryShape for LorebookEntry {
    const LABEL: &'static str = "lorebook entry";
}

/// Agent prompt message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct PromptMessage {
    role: String,
    content: String,
    enabled: bool,
}

impl Default for PromptMessage {
    fn default() -> Self {
        Self {
            role: "user".to_string(),
            content: String::new(),
            enabled: true,
        }
    }
}

impl EntryShape for PromptMessage {
    const LABEL: &'static str = "prompt message";
}

/// Agent structured-output field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct OutputField {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    description: String,
    required: bool,
    array: bool,
}

impl Default for OutputField {
    fn default() -> Self {
        Self {
            name: String::new(),
            field_type: "string".to_string(),
            description: String::new(),
            required: true,
            array: false,
        }
    }
}

impl EntryShape for OutputField {
    const LABEL: &'static str = "output field";
}

/// Flow data-store schema field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct DataStoreField {
    id: String,
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    initial_value: String,
    description: String,
}

impl Default for DataStoreField {
    fn default() -> Self {
        Self {
            id: new_id(),
            name: String::new(),
            field_type: "string".to_string(),
            initial_value: String::new(),
            description: String::new(),
        }
    }
}

impl EntryShape for DataStoreField {
    const LABEL: &'static str = "data-store field";
}

/// Update logic of a data-store node for one schema field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct DataStoreNodeField {
    schema_field_id: String,
    logic: String,
}

impl EntryShape for DataStoreNodeField {
    const LABEL: &'static str = "data-store node field";
}

/// If-node condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct IfCondition {
    id: String,
    data_type: String,
    value1: String,
    operator: String,
    value2: String,
}

impl Default for IfCondition {
    fn default() -> Self {
        Self {
            id: new_id(),
            data_type: "string".to_string(),
            value1: String::new(),
            operator: "equals".to_string(),
            value2: String::new(),
        }
    }
}

impl EntryShape for IfCondition {
    const LABEL: &'static str = "condition";
}
