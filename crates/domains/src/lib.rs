//! domains/src/lib.rs
//!
//! The domain models, identity rules and port definitions for the comment service.
//! Nothing in here performs I/O; adapters live in their own crates.

pub mod errors;
pub mod identity;
pub mod models;
pub mod ports;

// Re-exporting for easier access in other crates
pub use errors::*;
pub use identity::IdentityKey;
pub use models::*;
pub use ports::*;
