//! Error taxonomy
//!
//! Container failures, route registration failures and the single error type
//! handlers return. Everything a handler raises is converted into a
//! `Response` exactly once, at the dispatch boundary.

use std::collections::BTreeMap;
use thiserror::Error;

/// Field name to message map carried by validation failures
pub type FieldErrors = BTreeMap<String, String>;

/// Failures raised while the container builds a value
#[derive(Debug, Error)]
pub enum ContainerError {
    /// No binding, no instance and no concrete constructor for the type
    #[error("cannot resolve `{type_name}`: no binding registered and the type is not instantiable")]
    Unresolvable { type_name: &'static str },

    /// A constructor parameter has a primitive type and no default value
    #[error("cannot resolve parameter `{parameter}` of `{owner}`: primitive without a default")]
    UnresolvableParameter {
        owner: &'static str,
        parameter: &'static str,
    },

    /// The type (indirectly) depends on itself
    #[error("circular dependency while resolving: {chain}")]
    CircularDependency { chain: String },

    /// A binding produced a value of a different type than requested
    #[error("binding for `{type_name}` produced a value of another type")]
    TypeMismatch { type_name: &'static str },
}

/// Failures raised while registering a route
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("placeholder `{{{name}}}` appears more than once in `{pattern}`")]
    DuplicatePlaceholder { pattern: String, name: String },

    #[error("invalid placeholder `{{{name}}}` in `{pattern}`")]
    InvalidPlaceholder { pattern: String, name: String },

    #[error("pattern `{pattern}` did not compile: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Error returned by route handlers
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Submitted input was rejected, field by field
    #[error("validation failed for {} field(s)", .0.len())]
    Validation(FieldErrors),

    /// A referenced entity does not exist
    #[error("{0}")]
    NotFound(String),

    /// The controller or one of its dependencies could not be built
    #[error(transparent)]
    Resolution(#[from] ContainerError),

    /// Anything else
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl DispatchError {
    /// Build a validation failure from `(field, message)` pairs
    pub fn validation<I, K, V>(errors: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Validation(
            errors
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a not-found failure for a labelled resource
    pub fn not_found(resource: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{resource} not found"))
    }

    pub fn unexpected(message: impl std::fmt::Display) -> Self {
        Self::Unexpected(anyhow::anyhow!("{message}"))
    }

    /// HTTP status this failure maps to when rendered
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 422,
            Self::NotFound(_) => 404,
            Self::Resolution(_) | Self::Unexpected(_) => 500,
        }
    }
}

impl From<std::io::Error> for DispatchError {
    fn from(err: std::io::Error) -> Self {
        Self::Unexpected(err.into())
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Unexpected(err.into())
    }
}
