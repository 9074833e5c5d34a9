//! Error types for the operation engine
//!
//! Two layers of errors live here:
//! - Per-operation failures ([`OperationError`]), accumulated by the runner
//!   and never raised out of a batch
//! - Ordinary `Result` errors for services, processors, registration and
//!   configuration

use crate::types::Operation;
use chrono::{DateTime, Utc};
use patchwork_path::PatternError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Classification of a recorded operation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No registered pattern matches the path
    NoProcessorFound,
    /// The processor explicitly rejected the input
    HandlerFailure,
    /// The processor panicked or failed unexpectedly
    UnexpectedError,
    /// An external create/update call failed
    ServiceCallFailure,
    /// A created entity could not be read back
    VerificationFailure,
    /// The flow-level save failed after upstream steps succeeded
    PersistenceFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where in a batch a failure happened
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Position of the operation in the batch
    pub index: usize,
    /// Path after alias rewriting, when it differs from the submitted one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewritten_path: Option<String>,
    /// Template of the processor that handled the operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor: Option<String>,
    /// Captured stack or error chain for unexpected failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// A recorded failure of one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    /// The operation as submitted
    pub operation: Operation,
    /// Failure class
    pub kind: ErrorKind,
    /// Human-readable message
    pub error: String,
    /// When the failure was recorded
    pub timestamp: DateTime<Utc>,
    /// Batch context
    pub context: ErrorContext,
}

impl OperationError {
    /// Create error for operation at `index`
    #[must_use]
    pub fn new(
        operation: &Operation,
        kind: ErrorKind,
        error: impl Into<String>,
        index: usize,
    ) -> Self {
        Self {
            operation: operation.clone(),
            kind,
            error: error.into(),
            timestamp: Utc::now(),
            context: ErrorContext {
                index,
                ..ErrorContext::default()
            },
        }
    }

    /// With rewritten path
    #[inline]
    #[must_use]
    pub fn with_rewritten_path(mut self, path: Option<String>) -> Self {
        self.context.rewritten_path = path;
        self
    }

    /// With processor template
    #[inline]
    #[must_use]
    pub fn with_processor(mut self, template: impl Into<String>) -> Self {
        self.context.processor = Some(template.into());
        self
    }

    /// With captured stack
    #[inline]
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.context.stack = Some(stack.into());
        self
    }
}

/// Errors returned by external service contracts
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Entity does not exist (or is not readable yet)
    #[error("{entity} '{id}' not found")]
    NotFound { entity: String, id: String },

    /// Service refused the request
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Service could not be reached
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// Create not-found error
    #[inline]
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

/// Result alias for service calls
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors returned by a processor
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// Input explicitly rejected; the resource was left untouched
    #[error("{0}")]
    Rejected(String),

    /// An external call failed
    #[error("{call} failed: {source}")]
    Service {
        call: &'static str,
        #[source]
        source: ServiceError,
    },

    /// A created entity could not be read back
    #[error("entity '{entity_id}' unreadable after {attempts} attempt(s): {source}")]
    Verification {
        entity_id: String,
        attempts: u32,
        #[source]
        source: ServiceError,
    },

    /// Flow-level save failed
    #[error("saving nodes and edges of flow '{flow_id}' failed: {source}")]
    Persistence {
        flow_id: String,
        #[source]
        source: ServiceError,
    },

    /// Anything else
    #[error("unexpected failure: {0}")]
    Unexpected(#[from] anyhow::Error),
}

impl ProcessorError {
    /// Create rejection
    #[inline]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Create service failure
    #[inline]
    pub fn service(call: &'static str, source: ServiceError) -> Self {
        Self::Service { call, source }
    }

    /// Failure class recorded by the runner
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Rejected(_) => ErrorKind::HandlerFailure,
            Self::Service { .. } => ErrorKind::ServiceCallFailure,
            Self::Verification { .. } => ErrorKind::VerificationFailure,
            Self::Persistence { .. } => ErrorKind::PersistenceFailure,
            Self::Unexpected(_) => ErrorKind::UnexpectedError,
        }
    }
}

impl From<serde_json::Error> for ProcessorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Unexpected(err.into())
    }
}

/// Errors raised while building the processor table
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Template does not compile
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] PatternError),

    /// Another entry already routes exactly the same paths
    #[error("pattern '{template}' duplicates registered pattern '{existing}'")]
    DuplicatePattern { template: String, existing: String },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for `EngineConfig`
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parse but are out of range
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Errors raised while assembling an engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Processor registration failed
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Configuration rejected
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Builder is missing the service bundle
    #[error("no services configured")]
    MissingServices,
}
