//! Patchwork path matching
//!
//! Addresses and templates for routing path-addressed edit operations.
//!
//! # Core Concepts
//!
//! - [`OperationPath`]: a normalized concrete path (`plot.scenarios[2].name`)
//! - [`PathPattern`]: a compiled template (`plot.scenarios[{n}].{field}`)
//! - [`Captures`]: indices and field names captured by a match
//! - [`Specificity`]: ordering used to prefer narrower patterns
//!
//! # Example
//!
//! ```rust
//! use patchwork_path::{OperationPath, PathPattern};
//!
//! let pattern = PathPattern::compile("plot.scenarios[{n}].{field}").unwrap();
//! let path = OperationPath::parse("plot.scenarios[2].description").unwrap();
//!
//! let caps = pattern.captures(&path).unwrap();
//! assert_eq!(caps.index("n"), Some(2));
//! assert_eq!(caps.field("field"), Some("description"));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod path;
mod pattern;

pub use path::{OperationPath, PathError};
pub use pattern::{
    Capture, Captures, PathMatch, PathPattern, PatternError, PatternShape, Segment, SegmentShape,
    Specificity, TERMINAL_KEYWORDS,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
