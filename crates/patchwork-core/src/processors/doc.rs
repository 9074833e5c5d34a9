//! Navigation helpers over the untyped resource tree
//!
//! Missing (or null) intermediate nodes are created on the way down. An
//! existing node of the wrong type is a rejection, and since creation only
//! happens below the last existing node, a rejection never leaves a partial
//! path behind.

use crate::error::ProcessorError;
use serde_json::{Map, Value};

fn joined<K: AsRef<str>>(keys: &[K]) -> String {
    keys.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(".")
}

/// Object at `keys`, created if missing
pub(crate) fn object_at<'a, K: AsRef<str>>(
    root: &'a mut Value,
    keys: &[K],
) -> Result<&'a mut Map<String, Value>, ProcessorError> {
    let mut current = root;
    for (depth, key) in keys.iter().enumerate() {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map.entry(key.as_ref()).or_insert(Value::Null),
            _ => {
                return Err(ProcessorError::rejected(format!(
                    "'{}' is not an object",
                    display_prefix(&keys[..depth])
                )))
            }
        };
    }

    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => Ok(map),
        _ => Err(ProcessorError::rejected(format!(
            "'{}' is not an object",
            display_prefix(keys)
        ))),
    }
}

/// Array at `keys`, created if missing
pub(crate) fn array_at<'a, K: AsRef<str>>(
    root: &'a mut Value,
    keys: &[K],
) -> Result<&'a mut Vec<Value>, ProcessorError> {
    let Some((last, parents)) = keys.split_last() else {
        return Err(ProcessorError::rejected("empty target path"));
    };
    let slot = object_at(root, parents)?
        .entry(last.as_ref())
        .or_insert(Value::Null);
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(items) => Ok(items),
        _ => Err(ProcessorError::rejected(format!(
            "'{}' is not an array",
            joined(keys)
        ))),
    }
}

/// Value at `keys` without creating anything
pub(crate) fn value_at<'a, K: AsRef<str>>(root: &'a Value, keys: &[K]) -> Option<&'a Value> {
    keys.iter()
        .try_fold(root, |node, key| node.as_object()?.get(key.as_ref()))
}

/// String at `keys`, if present and non-empty
pub(crate) fn str_at<'a, K: AsRef<str>>(root: &'a Value, keys: &[K]) -> Option<&'a str> {
    value_at(root, keys)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Grow `items` to at least `len` elements using `fill`
pub(crate) fn extend_to<F>(items: &mut Vec<Value>, len: usize, mut fill: F) -> Result<(), ProcessorError>
where
    F: FnMut() -> Result<Value, ProcessorError>,
{
    while items.len() < len {
        items.push(fill()?);
    }
    Ok(())
}

fn display_prefix<K: AsRef<str>>(keys: &[K]) -> String {
    if keys.is_empty() {
        "resource".to_string()
    } else {
        joined(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_at_creates_missing_levels() {
        let mut doc = json!({});
        object_at(&mut doc, &["agent", "settings"])
            .unwrap()
            .insert("model".into(), json!("m1"));
        assert_eq!(doc, json!({"agent": {"settings": {"model": "m1"}}}));
    }

    #[test]
    fn object_at_replaces_null_root() {
        let mut doc = Value::Null;
        object_at(&mut doc, &["plot"]).unwrap();
        assert_eq!(doc, json!({"plot": {}}));
    }

    #[test]
    fn object_at_rejects_wrong_type_without_mutation() {
        let mut doc = json!({"plot": "text"});
        let err = object_at(&mut doc, &["plot", "lorebook"]).unwrap_err();
        assert_eq!(err.to_string(), "'plot' is not an object");
        assert_eq!(doc, json!({"plot": "text"}));
    }

    #[test]
    fn array_at_creates_and_rejects() {
        let mut doc = json!({});
        array_at(&mut doc, &["plot", "scenarios"]).unwrap().push(json!(1));
        assert_eq!(doc, json!({"plot": {"scenarios": [1]}}));

        let mut doc = json!({"plot": {"scenarios": {}}});
        let err = array_at(&mut doc, &["plot", "scenarios"]).unwrap_err();
        assert_eq!(err.to_string(), "'plot.scenarios' is not an array");
    }

    #[test]
    fn value_lookup_does_not_create() {
        let doc = json!({"flow": {"id": "f1", "name": ""}});
        assert_eq!(str_at(&doc, &["flow", "id"]), Some("f1"));
        assert_eq!(str_at(&doc, &["flow", "name"]), None);
        assert!(value_at(&doc, &["flow", "nodes"]).is_none());
    }

    #[test]
    fn extend_to_fills_with_defaults() {
        let mut items = vec![json!(0)];
        extend_to(&mut items, 3, || Ok(json!("d"))).unwrap();
        assert_eq!(items, vec![json!(0), json!("d"), json!("d")]);
        extend_to(&mut items, 1, || Ok(json!("x"))).unwrap();
        assert_eq!(items.len(), 3);
    }
}
