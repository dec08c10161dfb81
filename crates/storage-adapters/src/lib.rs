//! # storage-adapters
//!
//! Implementations of [`domains::CommentRepository`]. The in-memory store is
//! always compiled; SQLite sits behind the `db-sqlite` feature.

pub mod memory;
#[cfg(feature = "db-sqlite")]
pub mod sqlite;

pub use memory::InMemoryCommentRepository;
#[cfg(feature = "db-sqlite")]
pub use sqlite::SqliteCommentRepository;
