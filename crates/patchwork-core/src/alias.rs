//! Legacy path aliases
//!
//! Older card formats used other field names. Operations on those paths are
//! rewritten to the canonical ones before routing:
//!
//! - `character.first_mes`, `character.mes_example` are renamed to
//!   `character.example_dialogue`
//! - `character.personality` is folded into `character.description`; only
//!   `set` folds, other kinds keep the legacy path and fail routing

use crate::types::{Operation, OperationKind};
use patchwork_path::OperationPath;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;

/// Default text placed between a description and a folded personality
pub const DEFAULT_PERSONALITY_SEPARATOR: &str = "\n\n[Personality]\n";

#[derive(Debug, Clone)]
struct Fold {
    target: String,
    separator: String,
}

/// Maps deprecated paths to canonical ones
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    renames: HashMap<String, String>,
    folds: HashMap<String, Fold>,
}

impl AliasTable {
    /// Create empty table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in character aliases
    #[must_use]
    pub fn legacy_character(personality_separator: &str) -> Self {
        Self::new()
            .with_rename("character.first_mes", "character.example_dialogue")
            .with_rename("character.mes_example", "character.example_dialogue")
            .with_fold("character.personality", "character.description", personality_separator)
    }

    /// With a plain path rename
    #[must_use]
    pub fn with_rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.renames.insert(from.into(), to.into());
        self
    }

    /// With a fold: a `set` on `from` appends to the text at `target`
    #[must_use]
    pub fn with_fold(
        mut self,
        from: impl Into<String>,
        target: impl Into<String>,
        separator: impl Into<String>,
    ) -> Self {
        self.folds.insert(
            from.into(),
            Fold {
                target: target.into(),
                separator: separator.into(),
            },
        );
        self
    }

    /// Rewrite `op` against the current working copy
    ///
    /// Returns the operation unchanged when no alias applies.
    #[must_use]
    pub fn rewrite<'a>(&self, op: &'a Operation, resource: &Value) -> Cow<'a, Operation> {
        let key = op.path.trim();

        if let Some(to) = self.renames.get(key) {
            return Cow::Owned(Operation::new(to.clone(), op.operation, op.value.clone()));
        }

        let Some(fold) = self.folds.get(key) else {
            return Cow::Borrowed(op);
        };
        if op.operation != OperationKind::Set {
            return Cow::Borrowed(op);
        }

        let existing = OperationPath::parse(&fold.target)
            .ok()
            .and_then(|target| resource.pointer(&target.to_pointer()))
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty());

        let value = match (existing, &op.value) {
            (Some(existing), Value::String(addition)) => {
                Value::String(format!("{existing}{}{addition}", fold.separator))
            }
            (Some(existing), other) => {
                Value::String(format!("{existing}{}{other}", fold.separator))
            }
            (None, other) => other.clone(),
        };
        Cow::Owned(Operation::new(fold.target.clone(), OperationKind::Set, value))
    }
}
