//! Error types for the state container.

use std::any::Any;
use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No provider in scope for state type {state}")]
    MissingProvider { state: &'static str },

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("Invalid props: {0}")]
    InvalidProps(String),
}

/// A projection or selector panicked while deriving props.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Projection failed: {message}")]
pub struct ProjectionError {
    pub message: String,
}

impl ProjectionError {
    /// Build from a caught panic payload.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
