//! Batch application
//!
//! [`OperationRunner::apply`] clones the resource once, then feeds every
//! operation through alias rewriting, routing and its processor. A failing
//! operation is recorded and the batch moves on; `apply` itself never fails.

use crate::alias::AliasTable;
use crate::error::{ErrorKind, OperationError, ProcessorError};
use crate::registry::{OperationContext, ProcessorRegistry};
use crate::types::{ApplyOutcome, Operation};
use futures::FutureExt;
use patchwork_path::OperationPath;
use serde_json::Value;
use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::Instrument;

/// Applies operation batches through a registry
#[derive(Debug, Clone)]
pub struct OperationRunner {
    registry: Arc<ProcessorRegistry>,
    aliases: AliasTable,
}

impl OperationRunner {
    /// Create runner without aliases
    #[inline]
    #[must_use]
    pub fn new(registry: Arc<ProcessorRegistry>) -> Self {
        Self {
            registry,
            aliases: AliasTable::new(),
        }
    }

    /// With alias table
    #[inline]
    #[must_use]
    pub fn with_aliases(mut self, aliases: AliasTable) -> Self {
        self.aliases = aliases;
        self
    }

    /// Registry used for routing
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    /// Apply `operations` in order to a copy of `resource`
    pub async fn apply(&self, resource: &Value, operations: &[Operation]) -> ApplyOutcome {
        let mut working = resource.clone();
        let mut errors = Vec::new();
        let mut success_count = 0;

        for (index, operation) in operations.iter().enumerate() {
            let span = tracing::debug_span!("operation", index, path = %operation.path, kind = %operation.operation);
            match self.apply_one(index, operation, &mut working).instrument(span).await {
                Ok(()) => success_count += 1,
                Err(err) => {
                    tracing::warn!(
                        index,
                        path = %operation.path,
                        kind = %err.kind,
                        error = %err.error,
                        "operation failed"
                    );
                    errors.push(err);
                }
            }
        }

        tracing::info!(
            operations = operations.len(),
            succeeded = success_count,
            failed = errors.len(),
            "batch applied"
        );

        ApplyOutcome {
            result: working,
            errors,
            success_count,
        }
    }

    async fn apply_one(&self, index: usize, submitted: &Operation, working: &mut Value) -> Result<(), OperationError> {
        let op = self.aliases.rewrite(submitted, working);
        let rewritten = (op.path != submitted.path).then(|| op.path.clone());
        let fail = |kind: ErrorKind, message: String| {
            OperationError::new(submitted, kind, message, index).with_rewritten_path(rewritten.clone())
        };

        let path = OperationPath::parse(&op.path)
            .map_err(|err| fail(ErrorKind::NoProcessorFound, format!("invalid path: {err}")))?;
        let Some((entry, captures)) = self.registry.find(&path) else {
            return Err(fail(
                ErrorKind::NoProcessorFound,
                format!("no processor found for path '{path}'"),
            ));
        };
        tracing::debug!(processor = entry.template(), "routed");

        let mut ctx = OperationContext {
            index,
            path: &path,
            operation: op.operation,
            value: &op.value,
            resource: working,
        };
        let outcome = AssertUnwindSafe(entry.handler().process(&mut ctx, &captures))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => {
                let recorded = fail(err.kind(), err.to_string()).with_processor(entry.template());
                Err(match &err {
                    ProcessorError::Unexpected(inner) => recorded.with_stack(format!("{inner:?}")),
                    _ => recorded,
                })
            }
            Err(panic) => Err(fail(
                ErrorKind::UnexpectedError,
                format!("processor panicked: {}", panic_message(panic.as_ref())),
            )
            .with_processor(entry.template())
            .with_stack(Backtrace::force_capture().to_string())),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
