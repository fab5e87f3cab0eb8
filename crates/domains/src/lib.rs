//! forum-tree/crates/domains/src/lib.rs
//!
//! The domain model and port definitions for the threaded forum core.

pub mod errors;
pub mod models;
pub mod nested_set;
pub mod ports;

// Re-exporting for easier access in other crates
pub use errors::*;
pub use models::*;
pub use ports::*;
