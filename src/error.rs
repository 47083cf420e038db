//! Error types for page rendering.
//!
//! Soft failures (unknown root bindings, an unknown first filter) never
//! reach these types - they degrade to empty output inside the evaluator.
//! Everything here aborts the render it occurs in.

use thiserror::Error;

/// Raised by a filter callable
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Type error: expected a '{expected}' value, but found a '{found}' value")]
    TypeMismatch { expected: String, found: String },

    #[error("Invalid argument {index}: {message}")]
    InvalidArgument { index: usize, message: String },

    #[error("{0}")]
    Failed(String),
}

impl FilterError {
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        FilterError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Raised when a compiled binding accessor is invoked
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BindingError {
    #[error("Invalid binding path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Type '{type_name}' has no member '{member}'")]
    UnknownMember { type_name: String, member: String },

    #[error("Type '{type_name}' cannot be indexed by {index}")]
    InvalidIndex { type_name: String, index: String },
}

/// Raised while loading a page's content during initialization
#[derive(Debug, Error)]
pub enum PageSourceError {
    #[error("Page source not found: {path}")]
    NotFound { path: String },

    #[error("Failed to load page '{path}': {message}")]
    Load { path: String, message: String },
}

/// Main error type for a render pass
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Filter '{filter}' with {arity} argument(s) not found in {file}")]
    FilterNotFound {
        filter: String,
        arity: usize,
        file: String,
    },

    #[error("Page '{path}' has not been initialized")]
    NotInitialized { path: String },

    #[error("Page '{name}' not found (referenced from {file})")]
    PageNotFound { name: String, file: String },

    #[error("Filter '{filter}' failed in '{expression}' ({file}): {source}")]
    Filter {
        filter: String,
        expression: String,
        file: String,
        #[source]
        source: FilterError,
    },

    #[error("Binding '{binding}' failed ({file}): {source}")]
    Binding {
        binding: String,
        file: String,
        #[source]
        source: BindingError,
    },

    #[error("Partial target must be a page name, found a '{found}' value in {file}")]
    InvalidPartialTarget { found: String, file: String },

    #[error("Partial arguments must be a map, found a '{found}' value in {file}")]
    InvalidPartialArgs { found: String, file: String },

    #[error("Partial nesting exceeded {depth} levels in {file}")]
    PartialDepthExceeded { depth: usize, file: String },

    #[error("Page initialization failed: {0}")]
    Source(#[from] PageSourceError),

    #[error("Render cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
