//! Engine configuration
//!
//! Loaded from TOML or built in code with the `with_*` methods:
//!
//! ```toml
//! personality_separator = "\n\n[Personality]\n"
//! default_edge_type = "default"
//! disabled_domains = ["if_node"]
//! max_auto_extend = 10000
//!
//! [verification_retry]
//! max_attempts = 2
//! backoff = { kind = "fixed", delay_ms = 50 }
//! ```

use crate::alias::DEFAULT_PERSONALITY_SEPARATOR;
use crate::error::ConfigError;
use crate::registry::Domain;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default cap on the length an indexed edit may grow an entry array to
pub const DEFAULT_MAX_AUTO_EXTEND: usize = 10_000;

/// Default node palette
pub const DEFAULT_PALETTE: &[&str] = &[
    "#3b82f6", "#22c55e", "#f59e0b", "#ef4444", "#a855f7", "#06b6d4", "#ec4899", "#84cc16",
];

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Retry policy for read-after-write verification
    pub verification_retry: RetryPolicy,
    /// Inserted between an existing description and a folded legacy personality
    pub personality_separator: String,
    /// Edge type broadcast for edges stored without one
    pub default_edge_type: String,
    /// Processor domains whose entries are skipped during routing
    pub disabled_domains: Vec<Domain>,
    /// Maximum entries held by a query cache
    pub cache_capacity: u64,
    /// Largest array length an out-of-range index may auto-extend to
    pub max_auto_extend: usize,
    /// Colors handed out to new nodes, in order
    pub palette: Vec<String>,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML
    ///
    /// # Errors
    /// `ConfigError::Parse` for malformed TOML, `ConfigError::Invalid` for
    /// out-of-range values.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`EngineConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.verification_retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "verification_retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.default_edge_type.trim().is_empty() {
            return Err(ConfigError::Invalid("default_edge_type is empty".into()));
        }
        if self.palette.is_empty() {
            return Err(ConfigError::Invalid("palette is empty".into()));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid("cache_capacity must be positive".into()));
        }
        if self.max_auto_extend == 0 {
            return Err(ConfigError::Invalid("max_auto_extend must be positive".into()));
        }
        Ok(())
    }

    /// With verification retry policy
    #[inline]
    #[must_use]
    pub fn with_verification_retry(mut self, policy: RetryPolicy) -> Self {
        self.verification_retry = policy;
        self
    }

    /// With a disabled domain
    #[inline]
    #[must_use]
    pub fn with_disabled_domain(mut self, domain: Domain) -> Self {
        if !self.disabled_domains.contains(&domain) {
            self.disabled_domains.push(domain);
        }
        self
    }

    /// With auto-extend limit
    #[inline]
    #[must_use]
    pub fn with_max_auto_extend(mut self, limit: usize) -> Self {
        self.max_auto_extend = limit;
        self
    }

    /// With palette
    #[inline]
    #[must_use]
    pub fn with_palette(mut self, palette: Vec<String>) -> Self {
        self.palette = palette;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verification_retry: RetryPolicy::verification_default(),
            personality_separator: DEFAULT_PERSONALITY_SEPARATOR.to_string(),
            default_edge_type: "default".to_string(),
            disabled_domains: Vec::new(),
            cache_capacity: 1_000,
            max_auto_extend: DEFAULT_MAX_AUTO_EXTEND,
            palette: DEFAULT_PALETTE.iter().map(|c| (*c).to_string()).collect(),
        }
    }
}
