//! # Core Traits (Ports)
//!
//! Any store must implement these traits to be used by the service layer.

use async_trait::async_trait;

use crate::models::{Comment, CommentId, NewComment};

/// Data persistence contract for comments.
///
/// The store performs no business logic: it assigns ids and timestamps,
/// returns rows in creation order and cascades deletes to replies.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// All comments of a post, ascending by `created_at` (ties by `id`).
    async fn list_for_post(&self, post_slug: &str) -> anyhow::Result<Vec<Comment>>;

    /// Persists a new comment and returns it with `id` and `created_at` assigned.
    async fn insert(&self, comment: NewComment) -> anyhow::Result<Comment>;

    /// Whether `id` exists and belongs to `post_slug`.
    async fn exists_in_post(&self, post_slug: &str, id: CommentId) -> anyhow::Result<bool>;

    /// Removes a comment and its replies. Returns `false` if `id` did not exist.
    async fn delete(&self, id: CommentId) -> anyhow::Result<bool>;
}
