//! Route parameters
//!
//! Values captured by `{name}` placeholders, kept in declaration order.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

use crate::error::DispatchError;

/// A captured path segment
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Str(String),
}

impl ParamValue {
    /// Segments made only of ASCII digits become integers; everything else,
    /// including digit runs too large for `i64`, stays a string.
    pub fn coerce(raw: &str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = raw.parse::<i64>() {
                return Self::Int(n);
            }
        }
        Self::Str(raw.to_string())
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Int(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

/// Parameters of one route match, in the order placeholders appear
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    values: Vec<(String, ParamValue)>,
}

impl RouteParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, name: &str, raw: &str) {
        self.values.push((name.to_string(), ParamValue::coerce(raw)));
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Positional access, 0 being the first placeholder of the pattern
    pub fn nth(&self, index: usize) -> Option<&ParamValue> {
        self.values.get(index).map(|(_, v)| v)
    }

    /// Integer parameter.
    ///
    /// A missing or non-numeric value is a handler contract violation and
    /// surfaces as an unexpected failure.
    pub fn int(&self, name: &str) -> Result<i64, DispatchError> {
        match self.get(name) {
            Some(ParamValue::Int(n)) => Ok(*n),
            Some(ParamValue::Str(s)) => Err(DispatchError::unexpected(format!(
                "route parameter `{name}` must be an integer, got `{s}`"
            ))),
            None => Err(DispatchError::unexpected(format!(
                "route parameter `{name}` is missing"
            ))),
        }
    }

    /// Parameter rendered as text, whatever its kind
    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).map(ToString::to_string)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for RouteParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'a> FromIterator<(&'a str, ParamValue)> for RouteParams {
    fn from_iter<I: IntoIterator<Item = (&'a str, ParamValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(n, v)| (n.to_string(), v)).collect(),
        }
    }
}
