//! Validation error types

use std::fmt;

/// Input rejected before any tier is touched.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Field is empty (or whitespace only) when it shouldn't be
    Empty { field: &'static str },

    /// Coordinate is NaN or infinite
    NotFinite { field: &'static str, value: f64 },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { field } => write!(f, "{} is required", field),
            Self::NotFinite { field, value } => {
                write!(f, "{} must be a finite number, got {}", field, value)
            }
        }
    }
}

impl std::error::Error for ValidationError {}
