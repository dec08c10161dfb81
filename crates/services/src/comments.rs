//! # Comment use cases
//!
//! Coordinates validation, identity throttling and persistence for the
//! create / list / delete flows. Transport adapters call into this and only
//! translate [`DomainError`]s into their own responses.

use std::sync::Arc;

use domains::{Comment, CommentId, CommentRepository, DomainError, NewComment, Result};
use tracing::{error, warn};

use crate::comment_tree::build_comment_tree;
use crate::rate_limit::SlidingWindowLimiter;

pub const DEFAULT_MAX_CONTENT_CHARS: usize = 1000;

const RATE_LIMITED_MESSAGE: &str = "Too many comments. Please wait a minute before commenting again.";

pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    limiter: Arc<SlidingWindowLimiter>,
    max_content_chars: usize,
}

impl CommentService {
    pub fn new(repo: Arc<dyn CommentRepository>, limiter: Arc<SlidingWindowLimiter>) -> Self {
        Self {
            repo,
            limiter,
            max_content_chars: DEFAULT_MAX_CONTENT_CHARS,
        }
    }

    pub fn with_max_content_chars(mut self, max_content_chars: usize) -> Self {
        self.max_content_chars = max_content_chars;
        self
    }

    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }

    /// Validates, throttles and stores a new comment.
    ///
    /// The identity is charged before the parent lookup, so a reply to a missing
    /// parent still counts toward the author's allowance.
    pub async fn create(&self, draft: NewComment) -> Result<Comment> {
        self.validate(&draft)?;

        if !self.limiter.try_admit(&draft.author_name, &draft.author_email) {
            warn!(post_slug = %draft.post_slug, "comment rejected by rate limit");
            return Err(DomainError::RateLimitExceeded(RATE_LIMITED_MESSAGE.to_string()));
        }

        if let Some(parent_id) = draft.parent_id {
            let exists = self
                .repo
                .exists_in_post(&draft.post_slug, parent_id)
                .await
                .map_err(|e| store_failure("exists_in_post", e))?;
            if !exists {
                return Err(DomainError::ValidationError("Parent comment not found".into()));
            }
        }

        self.repo
            .insert(draft)
            .await
            .map_err(|e| store_failure("insert", e))
    }

    /// All comments of a post as a reply forest, oldest first at every level.
    pub async fn list(&self, post_slug: &str) -> Result<Vec<Comment>> {
        if post_slug.is_empty() {
            return Err(DomainError::ValidationError("post_slug parameter is required".into()));
        }

        let records = self
            .repo
            .list_for_post(post_slug)
            .await
            .map_err(|e| store_failure("list_for_post", e))?;
        Ok(build_comment_tree(records))
    }

    /// Deletes a comment together with its replies.
    pub async fn delete(&self, id: CommentId) -> Result<()> {
        let deleted = self
            .repo
            .delete(id)
            .await
            .map_err(|e| store_failure("delete", e))?;
        if deleted {
            Ok(())
        } else {
            Err(DomainError::NotFound("Comment".into()))
        }
    }

    fn validate(&self, draft: &NewComment) -> Result<()> {
        let required = [
            ("post_slug", &draft.post_slug),
            ("author_name", &draft.author_name),
            ("author_email", &draft.author_email),
            ("content", &draft.content),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(DomainError::ValidationError(format!("{field} is required")));
        }

        if draft.content.chars().count() > self.max_content_chars {
            return Err(DomainError::ValidationError(format!(
                "content must be less than {} characters",
                self.max_content_chars
            )));
        }
        Ok(())
    }
}

fn store_failure(operation: &'static str, err: anyhow::Error) -> DomainError {
    error!(operation, error = ?err, "comment store failed");
    DomainError::from(err)
}
