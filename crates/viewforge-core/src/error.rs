//! Error handling for the viewforge rendering library.
//!
//! This module defines the main error type `ViewError` used throughout the
//! library, along with a convenient `Result` type alias. It uses `thiserror`
//! and implements conversions from common error types.
//!
//! # Examples
//!
//! ```
//! use viewforge_core::error::{Result, ViewError};
//!
//! fn might_fail() -> Result<()> {
//!     Err(ViewError::InvalidConnection)
//! }
//!
//! assert!(might_fail().is_err());
//! ```

use std::error::Error as StdError;

use thiserror::Error;

use crate::store::ResolveKind;

/// Result type for view rendering operations
pub type Result<T> = std::result::Result<T, ViewError>;

/// Main error type for view rendering operations
#[derive(Debug, Error)]
pub enum ViewError {
    /// No candidate file matched and the view was not inline source
    #[error("{kind} template '{name}' not found")]
    TemplateNotFound { name: String, kind: ResolveKind },

    /// The template source failed to compile
    #[error("template '{name}' failed to compile: {message}")]
    TemplateSyntax { name: String, message: String },

    /// The compiled template failed while executing
    #[error("template '{name}' failed to execute: {message}")]
    TemplateExecution { name: String, message: String },

    /// A directive was called with missing or unusable arguments
    #[error("directive '{directive}': {message}")]
    DirectiveArgument { directive: String, message: String },

    /// Nested `render` calls went deeper than allowed
    #[error("render of '{name}' exceeded the maximum nesting depth of {depth}")]
    RenderDepthExceeded { name: String, depth: usize },

    /// A render was requested before the module was connected
    #[error("view module is not connected")]
    InvalidConnection,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal invariant failure, such as a poisoned lock
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ViewError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new directive argument error
    pub fn directive<D: Into<String>, M: Into<String>>(directive: D, message: M) -> Self {
        Self::DirectiveArgument {
            directive: directive.into(),
            message: message.into(),
        }
    }

    /// Wrap a Tera compile error for the named template
    pub(crate) fn syntax(name: &str, err: &tera::Error) -> Self {
        Self::TemplateSyntax {
            name: name.to_string(),
            message: diagnostic(err),
        }
    }

    /// Wrap a Tera render error for the named template
    pub(crate) fn execution(name: &str, err: &tera::Error) -> Self {
        Self::TemplateExecution {
            name: name.to_string(),
            message: diagnostic(err),
        }
    }
}

/// Flatten a Tera error and its source chain into one line.
///
/// Tera's top-level message is usually just "Failed to render 'x'"; the useful
/// part (the failing variable, the parser position, a directive's own error)
/// lives further down the chain.
pub(crate) fn diagnostic(err: &tera::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}
