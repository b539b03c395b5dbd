//! Error types for noteboard-core
//!
//! Only [`GatewayError`] ever reaches callers of the gateway. [`TierError`]
//! and [`ConnectionError`] stay inside the tier chain and decide fallthrough.

use std::time::Duration;

use thiserror::Error;

use crate::model::{NoteId, ValidationError};

pub type GatewayResult<T> = Result<T, GatewayError>;

pub type TierResult<T> = Result<T, TierError>;

/// Failures surfaced to the request layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("note '{id}' not found")]
    NotFound { id: NoteId },
}

/// Why a single tier could not serve a request
#[derive(Error, Debug, Clone)]
pub enum TierError {
    /// Tier is not configured; skipped without attempting any call
    #[error("tier unavailable: {0}")]
    Unavailable(&'static str),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    /// The backend answered but refused or failed the request
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for TierError {
    fn from(e: sqlx::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Primary database establishment failed after every retry.
///
/// Cloneable so one in-flight attempt can report the same failure to every
/// caller that joined it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("connection failed after {attempts} attempt(s): {reason}")]
pub struct ConnectionError {
    pub attempts: u32,
    pub reason: String,
}

impl ConnectionError {
    pub fn new(attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            attempts,
            reason: reason.into(),
        }
    }
}
