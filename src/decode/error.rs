use crate::spec::SchemaType;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Text does not have the shape the style or type requires.
    InvalidFormat,
    /// Style/explode combination the location does not support.
    UnsupportedFormat,
    /// No `anyOf`/`oneOf` branch accepted the value.
    NoMatch,
    /// More than one `oneOf` branch accepted the value.
    Ambiguous,
}

/// Failure to decode a serialized parameter value.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// Offending text (an item, a property value, or the whole value).
    pub value: String,
    pub reason: String,
    /// Item indexes and property names leading to the offending text.
    pub path: Vec<String>,
    /// Type the text was parsed as, when known.
    pub expected: Option<SchemaType>,
    pub cause: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            reason: reason.into(),
            path: Vec::new(),
            expected: None,
            cause: None,
        }
    }

    pub fn invalid(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ParseErrorKind::InvalidFormat, value, reason)
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::new(ParseErrorKind::UnsupportedFormat, "", reason)
    }

    pub fn with_expected(mut self, t: SchemaType) -> Self {
        self.expected = Some(t);
        self
    }

    pub fn with_cause(mut self, cause: impl ToString) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    /// Prefix the path with an enclosing item index or property name.
    pub fn within(mut self, segment: impl ToString) -> Self {
        self.path.insert(0, segment.to_string());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.path.is_empty() {
            write!(f, "path {}: ", self.path.join("."))?;
        }
        if self.value.is_empty() {
            write!(f, "{}", self.reason)?;
        } else {
            write!(f, "value {:?}: {}", self.value, self.reason)?;
        }
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}
