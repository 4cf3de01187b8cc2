//! Error types for the benchtab command line

use thiserror::Error;

/// Problems with the input arguments themselves
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("input {0:?} has an empty label")]
    EmptyLabel(String),

    #[error("input {0:?} has an empty path")]
    EmptyPath(String),

    #[error("label {0:?} is used by more than one input")]
    DuplicateLabel(String),
}
