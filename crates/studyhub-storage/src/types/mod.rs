//! Type definitions for studyhub storage.

mod activity;
mod groups;
mod ids;
mod memberships;
mod notices;
mod users;

// Re-export all types from submodules
pub use activity::*;
pub use groups::*;
pub use ids::*;
pub use memberships::*;
pub use notices::*;
pub use users::*;

/// Error returned when a persisted enum string is not recognised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl std::fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}
