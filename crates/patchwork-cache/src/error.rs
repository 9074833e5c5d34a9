//! Cache errors

use patchwork_core::ServiceError;
use thiserror::Error;

/// Failure to read or mutate cached data
#[derive(Debug, Error)]
pub enum CacheError {
    /// The fetcher could not produce a value for the key
    #[error("fetch for '{key}' failed: {source}")]
    Fetch {
        /// Cache key
        key: String,
        /// Underlying service failure
        #[source]
        source: ServiceError,
    },

    /// The real mutation behind an optimistic update failed
    #[error("mutation for '{key}' failed: {source}")]
    Mutation {
        /// Cache key
        key: String,
        /// Underlying service failure
        #[source]
        source: ServiceError,
    },

    /// Key does not name anything the fetcher knows
    #[error("unrecognized cache key '{0}'")]
    UnknownKey(String),

    /// Fetched document does not have the expected shape
    #[error("malformed document for '{key}': {reason}")]
    Malformed {
        /// Cache key
        key: String,
        /// What was wrong
        reason: String,
    },
}

impl CacheError {
    /// Whether this is a failed fetch
    #[inline]
    #[must_use]
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }
}
