//! Domain models with validation at construction
//!
//! Request input is validated when building a [`NoteDraft`] or a position
//! update. Invalid input returns ValidationError, not panic.

pub mod note;
pub mod validation;

pub use note::{
    validate_position, Note, NoteDraft, NoteId, NoteKind, DEFAULT_COORDINATE, MAX_NOTE_CHARS,
};
pub use validation::ValidationError;
