//! # DomainError
//!
//! Centralized error handling for the forum core.
//! Maps storage and tree failures to actionable error types.

use thiserror::Error;

use crate::models::{PostId, ThreadId};

/// The primary error type for all domain and service operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Resource not found (e.g., Forum, Thread, Post, tree node)
    #[error("{0} not found with ID {1}")]
    NotFound(&'static str, String),

    /// A reply referenced a parent that has no node in the thread's forest.
    #[error("parent post {parent} not found in thread {thread}")]
    ParentNotFound { parent: PostId, thread: ThreadId },

    /// Resource already exists (e.g., a second root for one forest)
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Nested-set bounds are corrupt. Never recovered from by continuing.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Another writer touched the same forest; safe to retry.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Validation failure (e.g., malformed last-post pointer)
    #[error("validation error: {0}")]
    Validation(String),

    /// Infrastructure failure (e.g., DB down)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound(entity, id.to_string())
    }

    /// Whether the failed operation may succeed when attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_))
    }
}

/// A specialized Result type for forum logic.
pub type DomainResult<T> = std::result::Result<T, DomainError>;
