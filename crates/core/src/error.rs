//! Error types for benchtab-core

use serde::Serialize;
use thiserror::Error;

/// Result type alias for benchtab-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors: invalid specifications and unreadable inputs.
///
/// Per-line problems are not errors in this sense; they are reported as
/// [`SyntaxError`] values alongside the records that did parse.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid projection: {0}")]
    Projection(#[from] ProjectionError),

    #[error("invalid filter: {0}")]
    Filter(#[from] FilterError),

    #[error("parsing {what}: {source}")]
    Spec {
        what: &'static str,
        #[source]
        source: ProjectionError,
    },

    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

/// A malformed line in a benchmark log.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{label}:{line}: {message}")]
pub struct SyntaxError {
    /// Label of the input the line came from
    pub label: String,
    /// 1-based line number
    pub line: usize,
    /// Human-readable cause
    pub message: String,
}

/// Errors compiling a projection specification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("unknown field {0:?}")]
    UnknownField(String),

    #[error(".unit is only allowed in table projections")]
    UnitNotAllowed,

    #[error("empty key in {0:?}")]
    EmptyKey(String),

    #[error("at least one field is required")]
    Empty,
}

/// Errors compiling or applying a filter expression.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterError {
    #[error("at offset {pos}: {message}")]
    Syntax { pos: usize, message: String },

    #[error("bad pattern {pattern:?}: {message}")]
    BadPattern { pattern: String, message: String },

    #[error("unknown field {0:?}")]
    UnknownField(String),

    #[error("{name}: no values with matching units")]
    NoMatchingUnits { name: String },
}
