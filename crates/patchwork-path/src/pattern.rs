//! Compiled path patterns
//!
//! A template such as `plot.scenarios[{n}].{field}` compiles into an ordered
//! list of [`Segment`] matchers:
//!
//! | Template piece | Segment            | Matches                    |
//! |----------------|--------------------|----------------------------|
//! | `scenarios`    | `Literal`          | exactly `scenarios`        |
//! | `[{n}]`        | `Index("n")`       | a non-negative integer     |
//! | `{field}`      | `Field("field")`   | any single segment         |
//! | `.append`      | `Terminal`         | exactly `append`, last     |

use crate::path::OperationPath;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Literals that act as terminal keywords when they close a template
pub const TERMINAL_KEYWORDS: &[&str] = &["append"];

/// One compiled segment matcher
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Must equal the literal exactly
    Literal(String),
    /// Captures an array index under the given name
    Index(String),
    /// Captures any segment under the given name
    Field(String),
    /// Keyword suffix such as `append`
    Terminal(String),
}

impl Segment {
    /// Rank used for specificity ordering (higher is more specific)
    #[inline]
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Self::Literal(_) | Self::Terminal(_) => 2,
            Self::Index(_) => 1,
            Self::Field(_) => 0,
        }
    }

    fn shape(&self) -> SegmentShape {
        match self {
            Self::Literal(lit) => SegmentShape::Literal(lit.clone()),
            Self::Terminal(kw) => SegmentShape::Literal(kw.clone()),
            Self::Index(_) => SegmentShape::Index,
            Self::Field(_) => SegmentShape::Field,
        }
    }
}

/// Segment with capture names erased
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SegmentShape {
    /// Literal or terminal keyword
    Literal(String),
    /// Any index placeholder
    Index,
    /// Any field placeholder
    Field,
}

/// Structural identity of a pattern, independent of capture names
///
/// `a[{n}].{field}` and `a[{i}].{key}` share a shape and therefore route
/// exactly the same paths.
pub type PatternShape = Vec<SegmentShape>;

/// Per-segment specificity, compared lexicographically
///
/// Among patterns matching the same path, the one whose leftmost differing
/// segment is more specific wins.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Specificity(Vec<u8>);

/// Captured value of a placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capture {
    /// From an `[{n}]` placeholder
    Index(usize),
    /// From a `{field}` placeholder
    Field(String),
}

/// Named captures produced by a successful match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures(BTreeMap<String, Capture>);

impl Captures {
    /// Captured index by name
    #[inline]
    #[must_use]
    pub fn index(&self, name: &str) -> Option<usize> {
        match self.0.get(name) {
            Some(Capture::Index(i)) => Some(*i),
            _ => None,
        }
    }

    /// Captured field name by name
    #[inline]
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(Capture::Field(f)) => Some(f.as_str()),
            _ => None,
        }
    }

    /// First captured index, whatever its name
    #[must_use]
    pub fn first_index(&self) -> Option<usize> {
        self.0.values().find_map(|c| match c {
            Capture::Index(i) => Some(*i),
            Capture::Field(_) => None,
        })
    }

    /// First captured field, whatever its name
    #[must_use]
    pub fn first_field(&self) -> Option<&str> {
        self.0.values().find_map(|c| match c {
            Capture::Field(f) => Some(f.as_str()),
            Capture::Index(_) => None,
        })
    }

    /// Number of captures
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was captured
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(name, capture)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Capture)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Outcome of matching one path against one pattern
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMatch {
    /// Whether the path matched structurally
    pub matches: bool,
    /// Captures (empty when `matches` is false)
    pub groups: Captures,
}

impl From<Option<Captures>> for PathMatch {
    fn from(captures: Option<Captures>) -> Self {
        match captures {
            Some(groups) => Self {
                matches: true,
                groups,
            },
            None => Self::default(),
        }
    }
}

/// Compiled path template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    template: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile a template
    ///
    /// # Errors
    /// Returns `PatternError` when the template is empty, has an empty
    /// segment, an unterminated `{`/`[`, a repeated capture name, or a
    /// terminal keyword that is not the last segment.
    pub fn compile(template: &str) -> Result<Self, PatternError> {
        let trimmed = template.trim();
        if trimmed.is_empty() {
            return Err(PatternError::Empty);
        }

        let raw = tokenize(trimmed)?;
        let last = raw.len() - 1;
        let mut segments = Vec::with_capacity(raw.len());
        let mut names: Vec<String> = Vec::new();

        for (pos, token) in raw.into_iter().enumerate() {
            let segment = match token {
                RawToken::Bracketed(inner) => match placeholder_name(&inner, trimmed)? {
                    Some(name) => Segment::Index(name),
                    None if parse_index(&inner).is_some() => Segment::Literal(inner),
                    None => {
                        return Err(PatternError::InvalidIndex {
                            template: trimmed.to_string(),
                            found: inner,
                        })
                    }
                },
                RawToken::Plain(text) => match placeholder_name(&text, trimmed)? {
                    Some(name) => Segment::Field(name),
                    None if TERMINAL_KEYWORDS.contains(&text.as_str()) => {
                        if pos != last {
                            return Err(PatternError::TerminalNotLast {
                                template: trimmed.to_string(),
                                keyword: text,
                            });
                        }
                        Segment::Terminal(text)
                    }
                    None => Segment::Literal(text),
                },
            };

            if let Segment::Index(name) | Segment::Field(name) = &segment {
                if names.contains(name) {
                    return Err(PatternError::DuplicateCapture(name.clone()));
                }
                names.push(name.clone());
            }
            segments.push(segment);
        }

        Ok(Self {
            template: trimmed.to_string(),
            segments,
        })
    }

    /// Source template
    #[inline]
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Compiled segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether the pattern ends in a terminal keyword
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Terminal(_)))
    }

    /// Specificity vector of this pattern
    #[must_use]
    pub fn specificity(&self) -> Specificity {
        Specificity(self.segments.iter().map(Segment::rank).collect())
    }

    /// Shape with capture names erased
    #[must_use]
    pub fn shape(&self) -> PatternShape {
        self.segments.iter().map(Segment::shape).collect()
    }

    /// Match a normalized path, returning captures on success
    #[must_use]
    pub fn captures(&self, path: &OperationPath) -> Option<Captures> {
        if path.len() != self.segments.len() {
            return None;
        }

        let mut groups = BTreeMap::new();
        for (segment, actual) in self.segments.iter().zip(path.iter()) {
            match segment {
                Segment::Literal(lit) | Segment::Terminal(lit) => {
                    if lit != actual {
                        return None;
                    }
                }
                Segment::Index(name) => {
                    let index = parse_index(actual)?;
                    groups.insert(name.clone(), Capture::Index(index));
                }
                Segment::Field(name) => {
                    groups.insert(name.clone(), Capture::Field(actual.to_string()));
                }
            }
        }

        Some(Captures(groups))
    }

    /// Whether a normalized path matches
    #[inline]
    #[must_use]
    pub fn is_match(&self, path: &OperationPath) -> bool {
        self.captures(path).is_some()
    }

    /// Normalize a raw path and match it
    ///
    /// An unparseable path never matches.
    #[must_use]
    pub fn match_path(&self, raw: &str) -> PathMatch {
        OperationPath::parse(raw)
            .ok()
            .and_then(|path| self.captures(&path))
            .into()
    }
}

impl Display for PathPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

impl FromStr for PathPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

enum RawToken {
    Plain(String),
    Bracketed(String),
}

fn tokenize(template: &str) -> Result<Vec<RawToken>, PatternError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut after_bracket = false;
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if current.is_empty() && !after_bracket {
                    return Err(PatternError::EmptySegment(template.to_string()));
                }
                if !current.is_empty() {
                    tokens.push(RawToken::Plain(std::mem::take(&mut current)));
                }
                after_bracket = false;
            }
            '[' => {
                if current.is_empty() && !after_bracket {
                    return Err(PatternError::EmptySegment(template.to_string()));
                }
                if !current.is_empty() {
                    tokens.push(RawToken::Plain(std::mem::take(&mut current)));
                }
                let mut inner = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(c);
                }
                if !closed {
                    return Err(PatternError::Unterminated(template.to_string()));
                }
                if inner.is_empty() {
                    return Err(PatternError::EmptySegment(template.to_string()));
                }
                tokens.push(RawToken::Bracketed(inner));
                after_bracket = true;
            }
            ']' => return Err(PatternError::Unterminated(template.to_string())),
            other => {
                if after_bracket {
                    // `a[{n}]b` has no separator after the bracket
                    return Err(PatternError::EmptySegment(template.to_string()));
                }
                current.push(other);
            }
        }
    }

    if !current.is_empty() {
        tokens.push(RawToken::Plain(current));
    } else if !after_bracket {
        return Err(PatternError::EmptySegment(template.to_string()));
    }

    Ok(tokens)
}

/// `{name}` → `Some(name)`, plain text → `None`
/// Unsigned decimal index; signs and other `usize` parse leniencies are refused
fn parse_index(text: &str) -> Option<usize> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn placeholder_name(text: &str, template: &str) -> Result<Option<String>, PatternError> {
    match (text.starts_with('{'), text.ends_with('}')) {
        (true, true) => {
            let name = &text[1..text.len() - 1];
            if name.is_empty() || name.contains(['{', '}']) {
                Err(PatternError::InvalidPlaceholder(template.to_string()))
            } else {
                Ok(Some(name.to_string()))
            }
        }
        (false, false) if !text.contains(['{', '}']) => Ok(None),
        _ => Err(PatternError::Unterminated(template.to_string())),
    }
}

/// Errors raised while compiling a template
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    /// Template is empty
    #[error("pattern template is empty")]
    Empty,

    /// Empty segment
    #[error("pattern '{0}' contains an empty segment")]
    EmptySegment(String),

    /// Unterminated `{` or `[`
    #[error("pattern '{0}' has an unterminated placeholder or bracket")]
    Unterminated(String),

    /// `{}` or nested braces
    #[error("pattern '{0}' has an invalid placeholder name")]
    InvalidPlaceholder(String),

    /// Bracket content is neither a placeholder nor an integer
    #[error("pattern '{template}' has invalid index '[{found}]'")]
    InvalidIndex { template: String, found: String },

    /// Same capture name used twice
    #[error("capture name '{0}' is used more than once")]
    DuplicateCapture(String),

    /// Terminal keyword in the middle of a template
    #[error("terminal keyword '{keyword}' must close pattern '{template}'")]
    TerminalNotLast { template: String, keyword: String },
}
