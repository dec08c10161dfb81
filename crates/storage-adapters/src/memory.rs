//! In-process comment store backed by a concurrent map.
//!
//! Used as the default backend and as the fixture for HTTP tests. Contents are
//! lost on restart.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use domains::{Comment, CommentId, CommentRepository, NewComment};

#[derive(Debug, Default)]
pub struct InMemoryCommentRepository {
    comments: DashMap<CommentId, Comment>,
    last_id: AtomicI64,
}

impl InMemoryCommentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommentRepository for InMemoryCommentRepository {
    async fn list_for_post(&self, post_slug: &str) -> anyhow::Result<Vec<Comment>> {
        let mut comments: Vec<Comment> = self
            .comments
            .iter()
            .filter(|entry| entry.post_slug == post_slug)
            .map(|entry| entry.value().clone())
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(comments)
    }

    async fn insert(&self, comment: NewComment) -> anyhow::Result<Comment> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        let comment = comment.into_comment(id, Utc::now());
        self.comments.insert(id, comment.clone());
        Ok(comment)
    }

    async fn exists_in_post(&self, post_slug: &str, id: CommentId) -> anyhow::Result<bool> {
        Ok(self
            .comments
            .get(&id)
            .is_some_and(|comment| comment.post_slug == post_slug))
    }

    /// Removes the comment and, like `ON DELETE CASCADE`, every reply beneath it.
    async fn delete(&self, id: CommentId) -> anyhow::Result<bool> {
        if self.comments.remove(&id).is_none() {
            return Ok(false);
        }

        let mut doomed = vec![id];
        while let Some(parent) = doomed.pop() {
            let children: Vec<CommentId> = self
                .comments
                .iter()
                .filter(|entry| entry.parent_id == Some(parent))
                .map(|entry| *entry.key())
                .collect();
            for child in children {
                if self.comments.remove(&child).is_some() {
                    doomed.push(child);
                }
            }
        }
        Ok(true)
    }
}
