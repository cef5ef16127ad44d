//! Route pattern compilation
//!
//! `{name}` placeholders become `([^/]+)` capture groups, literal text is
//! escaped and the whole pattern is anchored. Compiled once, at registration.

use regex::Regex;

use super::params::RouteParams;
use crate::error::RouteError;

/// `(start, end, name)` of every `{...}` span, `end` exclusive
fn placeholder_spans(pattern: &str) -> Vec<(usize, usize, &str)> {
    let mut spans = Vec::new();
    let mut cursor = 0;
    while let Some(offset) = pattern[cursor..].find('{') {
        let open = cursor + offset;
        let Some(len) = pattern[open..].find('}') else {
            break;
        };
        let close = open + len;
        spans.push((open, close + 1, &pattern[open + 1..close]));
        cursor = close + 1;
    }
    spans
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A pattern ready to be matched against request paths
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    regex: Regex,
    names: Vec<String>,
}

impl CompiledPattern {
    /// Compile a normalized pattern such as `/artes/{id}/editar`
    pub fn compile(pattern: &str) -> Result<Self, RouteError> {
        let mut expr = String::with_capacity(pattern.len() + 16);
        let mut names: Vec<String> = Vec::new();
        let mut last = 0;

        expr.push('^');
        for (start, end, name) in placeholder_spans(pattern) {
            if !is_identifier(name) {
                return Err(RouteError::InvalidPlaceholder {
                    pattern: pattern.to_string(),
                    name: name.to_string(),
                });
            }
            if names.iter().any(|n| n == name) {
                return Err(RouteError::DuplicatePlaceholder {
                    pattern: pattern.to_string(),
                    name: name.to_string(),
                });
            }
            expr.push_str(&regex::escape(&pattern[last..start]));
            expr.push_str("([^/]+)");
            names.push(name.to_string());
            last = end;
        }
        expr.push_str(&regex::escape(&pattern[last..]));
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|source| RouteError::Regex {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            names,
        })
    }

    /// Match a normalized path, returning captured parameters on success
    pub fn captures(&self, path: &str) -> Option<RouteParams> {
        let caps = self.regex.captures(path)?;
        let mut params = RouteParams::new();
        for (index, name) in self.names.iter().enumerate() {
            let value = caps.get(index + 1).map_or("", |m| m.as_str());
            params.push(name, value);
        }
        Some(params)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn placeholders(&self) -> &[String] {
        &self.names
    }
}

/// Normalize a path: leading `/`, no trailing `/` except for the root
pub fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Join a group prefix and a pattern with exactly one `/`
pub fn join(prefix: &str, pattern: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let pattern = pattern.trim_matches('/');
    match (prefix.is_empty(), pattern.is_empty()) {
        (true, _) => normalize(pattern),
        (false, true) => normalize(prefix),
        (false, false) => format!("/{prefix}/{pattern}"),
    }
}
