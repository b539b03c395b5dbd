//! Note entity, its opaque identifier, and the validated creation draft

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Maximum note length, counted in characters after trimming
pub const MAX_NOTE_CHARS: usize = 100;

/// Position used when a stored document carries no usable coordinate
pub const DEFAULT_COORDINATE: f64 = 100.0;

const RANDOM_X: std::ops::Range<u32> = 50..450;
const RANDOM_Y: std::ops::Range<u32> = 50..350;

/// Backend-assigned note identifier.
///
/// Remote document ids, database UUIDs and fallback-store ids all end up here
/// as plain strings, so callers never branch on the backend that issued one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a caller-supplied id, rejecting blank input.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty { field: "id" });
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NoteId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Visual style of a note on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    #[default]
    Note,
    Present,
}

impl NoteKind {
    /// Anything other than exactly `present` is a plain note.
    pub fn from_input(raw: Option<&str>) -> Self {
        match raw {
            Some("present") => Self::Present,
            _ => Self::Note,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Present => "present",
        }
    }
}

impl fmt::Display for NoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted note as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub id: NoteId,
    pub text: String,
    pub kind: NoteKind,
    pub x: f64,
    pub y: f64,
    /// Only consulted for duplicate detection.
    #[serde(skip_serializing)]
    pub created_at: DateTime<Utc>,
}

/// Validated input for a new note, not yet assigned an id
#[derive(Debug, Clone, PartialEq)]
pub struct NoteDraft {
    pub text: String,
    pub kind: NoteKind,
    pub x: f64,
    pub y: f64,
}

impl NoteDraft {
    /// Validate and normalize creation input.
    ///
    /// # Rules
    /// - `text` is trimmed, must be non-empty, and is cut to 100 characters
    /// - `kind` is `present` only when given exactly that string
    /// - missing or non-finite coordinates get a random on-board position
    ///
    /// # Example
    /// ```
    /// use noteboard_core::model::{NoteDraft, NoteKind};
    ///
    /// let draft = NoteDraft::new("  Happy Birthday!  ", None, Some(10.0), Some(20.0)).unwrap();
    /// assert_eq!(draft.text, "Happy Birthday!");
    /// assert_eq!(draft.kind, NoteKind::Note);
    /// assert!(NoteDraft::new("   ", None, None, None).is_err());
    /// ```
    pub fn new(
        text: &str,
        kind: Option<&str>,
        x: Option<f64>,
        y: Option<f64>,
    ) -> Result<Self, ValidationError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty { field: "note" });
        }
        let text: String = trimmed.chars().take(MAX_NOTE_CHARS).collect();

        let mut rng = rand::thread_rng();
        let x = match x {
            Some(v) if v.is_finite() => v,
            _ => f64::from(rng.gen_range(RANDOM_X)),
        };
        let y = match y {
            Some(v) if v.is_finite() => v,
            _ => f64::from(rng.gen_range(RANDOM_Y)),
        };

        Ok(Self {
            text,
            kind: NoteKind::from_input(kind),
            x,
            y,
        })
    }

    /// Attach the identifier and timestamp assigned by a tier.
    pub fn into_note(self, id: NoteId, created_at: DateTime<Utc>) -> Note {
        Note {
            id,
            text: self.text,
            kind: self.kind,
            x: self.x,
            y: self.y,
            created_at,
        }
    }
}

/// Validate a position update request.
pub fn validate_position(id: &str, x: f64, y: f64) -> Result<NoteId, ValidationError> {
    let id = NoteId::parse(id)?;
    if !x.is_finite() {
        return Err(ValidationError::NotFinite { field: "x", value: x });
    }
    if !y.is_finite() {
        return Err(ValidationError::NotFinite { field: "y", value: y });
    }
    Ok(id)
}
