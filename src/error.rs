//! Error types for rendering, negotiation and document parsing.

use thiserror::Error;

/// Errors raised while rendering or parsing documents.
///
/// Every variant is recoverable at the HTTP boundary: callers should turn
/// them into problem-detail documents via [`crate::problem_document`]
/// rather than surface a bare failure. Engine invariant violations are not
/// part of this taxonomy.
#[derive(Debug, Error)]
pub enum RenderError {
    // Metadata errors (exit code 2)
    #[error("resource \"{resource}\" declares no identifier properties")]
    IdentifierNotFound { resource: String },

    #[error("identifier property \"{property}\" of \"{resource}\" has no value")]
    MissingIdentifierValue { resource: String, property: String },

    #[error("unknown resource \"{resource}\"")]
    UnknownResource { resource: String },

    // Query errors (exit code 2)
    #[error("filter property \"{path}\" does not resolve to a field")]
    InvalidFilterProperty { path: String },

    // Negotiation errors (exit code 2)
    #[error("no acceptable format; supported: {}", supported.join(", "))]
    NotAcceptable { supported: Vec<String> },

    #[error("format {format} is not configured for operation \"{operation}\"")]
    UnsupportedFormat { format: String, operation: String },

    // Traversal guard (exit code 2)
    #[error("embedding depth exceeded configured limit of {limit}")]
    DepthExceeded { limit: usize },

    // Incoming document errors (exit code 1)
    #[error("invalid document at {path}: {message}")]
    InvalidDocument { path: String, message: String },

    // IO errors, CLI only (exit code 3)
    #[error("cannot read {path}: {source}")]
    ReadError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },
}

impl RenderError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            RenderError::InvalidDocument { .. } => 1,
            RenderError::ReadError { .. } => 3,
            _ => 2,
        }
    }

    /// HTTP status a boundary layer should answer with.
    pub fn status(&self) -> u16 {
        match self {
            RenderError::NotAcceptable { .. } => 406,
            RenderError::UnknownResource { .. } => 404,
            RenderError::InvalidFilterProperty { .. }
            | RenderError::InvalidDocument { .. }
            | RenderError::InvalidJson { .. } => 400,
            _ => 500,
        }
    }

    /// Short problem-detail title for the variant.
    pub fn title(&self) -> &'static str {
        match self {
            RenderError::NotAcceptable { .. } => "Not Acceptable",
            RenderError::UnknownResource { .. } => "Not Found",
            RenderError::InvalidFilterProperty { .. }
            | RenderError::InvalidDocument { .. }
            | RenderError::InvalidJson { .. } => "Bad Request",
            _ => "Internal Server Error",
        }
    }
}

/// Single schema-validation failure with path context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DocumentError {
    /// JSON Pointer (RFC 6901) to the invalid member.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}
