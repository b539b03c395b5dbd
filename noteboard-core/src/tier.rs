//! Durable tier trait
//!
//! The remote document API and the primary database both implement
//! [`DurableTier`]. The gateway walks them in priority order and inspects
//! each [`TierResult`] to decide whether to stop or move on.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::TierResult;
use crate::model::{Note, NoteDraft, NoteId};

/// Which backend satisfied a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    Remote,
    Database,
    Memory,
}

impl TierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Database => "database",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a position update that reached the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    Applied,
    /// The backend answered but holds no note with that id
    Missed,
}

/// A backend that persists notes beyond the life of the process
#[async_trait]
pub trait DurableTier: Send + Sync {
    fn kind(&self) -> TierKind;

    /// Unconfigured tiers are skipped without attempting any call.
    fn is_configured(&self) -> bool {
        true
    }

    async fn list(&self) -> TierResult<Vec<Note>>;

    /// Most recently created note whose text equals `text` exactly.
    async fn latest_with_text(&self, text: &str) -> TierResult<Option<Note>>;

    async fn insert(&self, draft: &NoteDraft) -> TierResult<Note>;

    async fn update_position(&self, id: &NoteId, x: f64, y: f64) -> TierResult<UpdateStatus>;

    /// Whether the tier currently holds a live connection. Must not
    /// establish one.
    async fn is_live(&self) -> bool {
        false
    }
}
