//! Unified error type for the remedial action optimisation workspace.
//!
//! Every crate converts its domain failures into [`RaoError`] at API
//! boundaries so callers handle catalog, configuration and solver problems
//! uniformly.
//!
//! # Example
//!
//! ```ignore
//! use rao_core::{RaoError, RaoResult};
//!
//! fn load(path: &str) -> RaoResult<Catalog> {
//!     let text = std::fs::read_to_string(path)?;
//!     let definition: CatalogDefinition = serde_json::from_str(&text)?;
//!     definition.build()
//! }
//! ```

use thiserror::Error;

/// Unified error type for all RAO operations.
#[derive(Error, Debug)]
pub enum RaoError {
    /// I/O errors (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid parameters or an unsupported solver/feature combination.
    /// Raised before any optimisation starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Catalog and grid data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// The sensitivity provider could not produce a result
    #[error("Sensitivity error: {0}")]
    Sensitivity(String),

    /// LP/MIP backend errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using RaoError.
pub type RaoResult<T> = Result<T, RaoError>;

impl From<serde_json::Error> for RaoError {
    fn from(err: serde_json::Error) -> Self {
        RaoError::Parse(err.to_string())
    }
}

impl RaoError {
    /// True for errors that must abort a run before any search starts.
    pub fn is_configuration(&self) -> bool {
        matches!(self, RaoError::Configuration(_) | RaoError::Validation(_))
    }
}
