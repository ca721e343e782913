//! Storage abstraction for studyhub.
//!
//! Backend crates (`studyhub-store-sqlite`, `studyhub-store-postgres`) implement
//! these traits so the membership core doesn't depend on any specific database
//! engine or schema details.

use thiserror::Error;

mod store;
pub mod types;

pub use store::{Store, UnitOfWork};
pub use types::*;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("conflict")]
    Conflict,
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Wrap any backend failure, keeping only its message.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<ParseEnumError> for StoreError {
    fn from(err: ParseEnumError) -> Self {
        StoreError::Backend(err.to_string())
    }
}
