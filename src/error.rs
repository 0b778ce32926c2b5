//! Error types
//!
//! Absence is never an error. Only two conditions surface: a path that cannot
//! be compiled, and a `require` step (or required record field) that found
//! nothing.

use thiserror::Error;

/// Raised while turning a [`PathSpec`](crate::PathSpec) into a [`Plan`](crate::Plan)
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unknown transform: {0}")]
    UnknownTransform(String),

    #[error("unknown comparison operator: {0}")]
    UnknownComparison(String),

    #[error("transform `{transform}` does not take argument `{arg}`")]
    UnexpectedArgument { transform: String, arg: String },

    #[error("transform `{transform}` requires argument `{arg}`")]
    MissingArgument { transform: String, arg: String },

    #[error("invalid argument `{arg}` for `{transform}`: {reason}")]
    InvalidArgument {
        transform: String,
        arg: String,
        reason: String,
    },

    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid CSS selector: {0}")]
    InvalidSelector(String),

    #[error("invalid base URL `{url}`: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid slice: step must not be zero")]
    ZeroSliceStep,
}

/// Raised while evaluating a compiled plan
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// A required value was absent
    #[error("missing required field: {field}")]
    MissingField { field: String },
}

impl ExtractError {
    pub fn missing(field: impl Into<String>) -> Self {
        ExtractError::MissingField {
            field: field.into(),
        }
    }

    /// The human readable label of the field that was being extracted
    pub fn field(&self) -> &str {
        match self {
            ExtractError::MissingField { field } => field,
        }
    }
}

/// Crate level error for callers that compile and evaluate in one go
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("failed to parse path description: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
