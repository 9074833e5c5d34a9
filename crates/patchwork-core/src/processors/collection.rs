//! Array-of-entries processors
//!
//! Every entry collection is addressed by three templates:
//!
//! | Template                    | Shape     | Kinds        |
//! |-----------------------------|-----------|--------------|
//! | `<prefix>.append`           | `Append`  | put          |
//! | `<prefix>[{n}]`             | `Indexed` | put, remove  |
//! | `<prefix>[{n}].{field}`     | `Field`   | set          |
//!
//! Indexed and field operations grow the array with default entries up to
//! the addressed index, so an out-of-range index never fails as long as the
//! grown array stays within the collection's auto-extend limit.

use super::doc::{array_at, extend_to, value_at};
use super::entries::EntryShape;
use super::json::accepted_value;
use crate::config::DEFAULT_MAX_AUTO_EXTEND;
use crate::error::{ProcessorError, RegistryError};
use crate::registry::{Domain, OperationContext, OperationResult, Processor, ProcessorRegistry};
use crate::types::OperationKind;
use patchwork_path::Captures;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Which of the three templates an entry serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape {
    Append,
    Indexed,
    Field,
}

impl Shape {
    pub(crate) const ALL: [Shape; 3] = [Shape::Append, Shape::Indexed, Shape::Field];

    pub(crate) fn template(self, prefix: &str) -> String {
        match self {
            Self::Append => format!("{prefix}.append"),
            Self::Indexed => format!("{prefix}[{{n}}]"),
            Self::Field => format!("{prefix}[{{n}}].{{field}}"),
        }
    }

    fn allowed(self) -> &'static [OperationKind] {
        match self {
            Self::Append => &[OperationKind::Put],
            Self::Indexed => &[OperationKind::Put, OperationKind::Remove],
            Self::Field => &[OperationKind::Set],
        }
    }
}

/// Typed array living at a fixed key path
pub(crate) struct EntryCollection<T> {
    keys: Vec<String>,
    max_auto_extend: usize,
    _entry: PhantomData<fn() -> T>,
}

impl<T: EntryShape> EntryCollection<T> {
    /// Collection at a dotted key path relative to the target document
    pub(crate) fn at(prefix: &str) -> Self {
        Self {
            keys: prefix.split('.').map(str::to_string).collect(),
            max_auto_extend: DEFAULT_MAX_AUTO_EXTEND,
            _entry: PhantomData,
        }
    }

    /// With the largest length auto-extension may grow the array to
    pub(crate) fn with_max_auto_extend(mut self, limit: usize) -> Self {
        self.max_auto_extend = limit;
        self
    }

    /// Addressed index, refused when reaching it would grow past the limit
    fn index(&self, target: &Value, captures: &Captures) -> Result<usize, ProcessorError> {
        let n = captures
            .index("n")
            .ok_or_else(|| ProcessorError::rejected("missing entry index"))?;
        let len = value_at(target, &self.keys)
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        if n >= len && n >= self.max_auto_extend {
            return Err(ProcessorError::rejected(format!(
                "{} index {n} exceeds the auto-extend limit of {}",
                T::LABEL,
                self.max_auto_extend
            )));
        }
        Ok(n)
    }

    /// Apply one operation to `target`
    ///
    /// Input is validated before anything in `target` changes.
    pub(crate) fn apply(
        &self,
        target: &mut Value,
        shape: Shape,
        kind: OperationKind,
        value: &Value,
        captures: &Captures,
    ) -> OperationResult {
        if !shape.allowed().contains(&kind) {
            return Err(ProcessorError::rejected(format!(
                "operation '{kind}' is not supported on {} {}",
                T::LABEL,
                match shape {
                    Shape::Append => "append",
                    Shape::Indexed => "index",
                    Shape::Field => "fields",
                }
            )));
        }

        match (shape, kind) {
            (Shape::Append, _) => {
                let entry = T::normalize(value)?;
                array_at(target, &self.keys)?.push(entry.clone());
                Ok(Some(entry))
            }
            (Shape::Indexed, OperationKind::Remove) => {
                let n = self.index(target, captures)?;
                let items = array_at(target, &self.keys)?;
                extend_to(items, n + 1, T::default_value)?;
                Ok(Some(items.remove(n)))
            }
            (Shape::Indexed, _) => {
                let n = self.index(target, captures)?;
                let entry = T::normalize(value)?;
                let items = array_at(target, &self.keys)?;
                extend_to(items, n + 1, T::default_value)?;
                items[n] = entry.clone();
                Ok(Some(entry))
            }
            (Shape::Field, _) => {
                let n = self.index(target, captures)?;
                let field = captures
                    .field("field")
                    .ok_or_else(|| ProcessorError::rejected("missing field name"))?;
                let accepted =
                    accepted_value(value, |v| T::check_field(field, v)).map_err(ProcessorError::rejected)?;

                let items = array_at(target, &self.keys)?;
                if let Some(existing) = items.get(n) {
                    if !existing.is_object() {
                        return Err(ProcessorError::rejected(format!(
                            "{} {n} is not an object",
                            T::LABEL
                        )));
                    }
                }
                extend_to(items, n + 1, T::default_value)?;
                if let Value::Object(entry) = &mut items[n] {
                    entry.insert(field.to_string(), accepted.clone());
                }
                Ok(Some(accepted))
            }
        }
    }
}

/// In-memory collection processor
pub(crate) struct CollectionProcessor<T> {
    collection: EntryCollection<T>,
    shape: Shape,
}

#[async_trait::async_trait]
impl<T: EntryShape + 'static> Processor for CollectionProcessor<T> {
    async fn process(&self, ctx: &mut OperationContext<'_>, captures: &Captures) -> OperationResult {
        self.collection
            .apply(ctx.resource, self.shape, ctx.operation, ctx.value, captures)
    }
}

/// Register the append, indexed and field templates of a collection
pub(crate) fn register<T: EntryShape + 'static>(
    registry: &mut ProcessorRegistry,
    domain: Domain,
    prefix: &str,
    max_auto_extend: usize,
) -> Result<(), RegistryError> {
    for shape in Shape::ALL {
        let description = match shape {
            Shape::Append => format!("append a {}", T::LABEL),
            Shape::Indexed => format!("replace or remove a {} by index", T::LABEL),
            Shape::Field => format!("set one field of a {}", T::LABEL),
        };
        registry.register(
            &shape.template(prefix),
            description,
            domain,
            Arc::new(CollectionProcessor::<T> {
                collection: EntryCollection::at(prefix).with_max_auto_extend(max_auto_extend),
                shape,
            }),
        )?;
    }
    Ok(())
}
