//! # Domain Models
//!
//! These structs represent the comment records the store hands out.
//! Ids are store-assigned integers and `created_at` is the only ordering key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned comment identifier.
pub type CommentId = i64;

/// A persisted comment, optionally carrying its assembled reply tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    /// Opaque identifier of the post this comment belongs to
    pub post_slug: String,
    /// `None` marks a top-level comment
    pub parent_id: Option<CommentId>,
    pub author_name: String,
    pub author_email: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Derived by the tree assembler, never persisted.
    #[serde(default)]
    pub replies: Vec<Comment>,
}

impl Comment {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Number of comments in this subtree, including `self`.
    pub fn thread_size(&self) -> usize {
        1 + self.replies.iter().map(Comment::thread_size).sum::<usize>()
    }
}

/// A comment as submitted by a client, before the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    pub post_slug: String,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    pub author_name: String,
    pub author_email: String,
    pub content: String,
}

impl NewComment {
    /// Materializes the stored record once the store has assigned its identity.
    pub fn into_comment(self, id: CommentId, created_at: DateTime<Utc>) -> Comment {
        Comment {
            id,
            post_slug: self.post_slug,
            parent_id: self.parent_id,
            author_name: self.author_name,
            author_email: self.author_email,
            content: self.content,
            created_at,
            replies: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(parent_id: Option<CommentId>) -> NewComment {
        NewComment {
            post_slug: "hello-world".into(),
            parent_id,
            author_name: "Alice".into(),
            author_email: "alice@example.com".into(),
            content: "First!".into(),
        }
    }

    #[test]
    fn into_comment_starts_without_replies() {
        let now = Utc::now();
        let comment = draft(Some(3)).into_comment(7, now);
        assert_eq!(comment.id, 7);
        assert_eq!(comment.parent_id, Some(3));
        assert_eq!(comment.created_at, now);
        assert!(comment.replies.is_empty());
        assert!(!comment.is_top_level());
    }

    #[test]
    fn replies_serialize_as_empty_array() {
        let comment = draft(None).into_comment(1, Utc::now());
        let json = serde_json::to_value(&comment).unwrap();
        assert_eq!(json["replies"], serde_json::json!([]));
        assert_eq!(json["parent_id"], serde_json::Value::Null);
    }

    #[test]
    fn parent_id_is_optional_on_input() {
        let parsed: NewComment = serde_json::from_str(
            r#"{"post_slug":"p","author_name":"a","author_email":"e","content":"c"}"#,
        )
        .unwrap();
        assert_eq!(parsed.parent_id, None);
    }

    #[test]
    fn thread_size_counts_nested_replies() {
        let now = Utc::now();
        let mut root = draft(None).into_comment(1, now);
        let mut child = draft(Some(1)).into_comment(2, now);
        child.replies.push(draft(Some(2)).into_comment(3, now));
        root.replies.push(child);
        assert_eq!(root.thread_size(), 3);
    }
}
