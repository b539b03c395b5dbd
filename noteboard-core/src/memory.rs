//! In-process fallback store
//!
//! Last tier in the chain: accepts every write, never deduplicates, and
//! forgets everything on restart. Notes placed here are never promoted to a
//! durable tier.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use rand::Rng;

use crate::error::GatewayError;
use crate::model::{Note, NoteDraft, NoteId};

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Insertion-ordered notes behind a single lock
#[derive(Debug, Default)]
pub struct FallbackStore {
    notes: Mutex<Vec<Note>>,
}

impl FallbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notes in insertion order.
    pub fn list(&self) -> Vec<Note> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Append a note under a freshly generated local id.
    pub fn create(&self, draft: NoteDraft) -> Note {
        let note = draft.into_note(generate_id(), Utc::now());
        self.lock().push(note.clone());
        note
    }

    /// Move a note in place; the rest of the note is untouched.
    pub fn update_position(&self, id: &NoteId, x: f64, y: f64) -> Result<Note, GatewayError> {
        let mut notes = self.lock();
        let note = notes
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| GatewayError::NotFound { id: id.clone() })?;
        note.x = x;
        note.y = y;
        Ok(note.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Note>> {
        self.notes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Base-36 millisecond timestamp followed by six random base-36 characters.
fn generate_id() -> NoteId {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();

    let mut id = to_base36(millis);
    let mut rng = rand::thread_rng();
    id.extend((0..6).map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char));
    NoteId::new(id)
}

fn to_base36(mut n: u128) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}
