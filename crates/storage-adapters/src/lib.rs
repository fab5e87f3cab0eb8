//! # storage-adapters
//!
//! `ForumStore` implementations. SQLite is the production backend
//! (feature `db-sqlite`); the in-memory store backs unit tests and can
//! inject faults between the steps of a tree mutation.

pub mod memory;
#[cfg(feature = "db-sqlite")]
pub mod sqlite;

pub use memory::{FaultPoint, InMemoryForumStore};
#[cfg(feature = "db-sqlite")]
pub use sqlite::SqliteForumStore;
