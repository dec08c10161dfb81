//! # SQLite comment store
//!
//! This module implements the data mapping between the SQLite `comments` table
//! and the `domains` models. The table is append-only apart from deletes, which
//! cascade to replies through the `parent_id` foreign key.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{Comment, CommentId, CommentRepository, NewComment};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS comments (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    post_slug    TEXT NOT NULL,
    parent_id    INTEGER DEFAULT NULL REFERENCES comments(id) ON DELETE CASCADE,
    author_name  TEXT NOT NULL,
    author_email TEXT NOT NULL,
    content      TEXT NOT NULL,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_comments_post_slug ON comments(post_slug, created_at);
CREATE INDEX IF NOT EXISTS idx_comments_parent_id ON comments(parent_id);
"#;

pub struct SqliteCommentRepository {
    pool: SqlitePool,
}

impl SqliteCommentRepository {
    /// Opens (creating if needed) the database at `url` and ensures the schema exists.
    ///
    /// An in-memory database lives and dies with its connection, so it is pinned
    /// to a single connection that is never recycled.
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool_options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections)
        };

        let repo = Self::new(pool_options.connect_with(options).await?);
        repo.migrate().await?;
        info!("sqlite comment store ready");
        Ok(repo)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

fn row_to_comment(row: &SqliteRow) -> Result<Comment, sqlx::Error> {
    Ok(Comment {
        id: row.try_get("id")?,
        post_slug: row.try_get("post_slug")?,
        parent_id: row.try_get("parent_id")?,
        author_name: row.try_get("author_name")?,
        author_email: row.try_get("author_email")?,
        content: row.try_get("content")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        replies: Vec::new(),
    })
}

#[async_trait]
impl CommentRepository for SqliteCommentRepository {
    async fn list_for_post(&self, post_slug: &str) -> anyhow::Result<Vec<Comment>> {
        let rows = sqlx::query(
            "SELECT id, post_slug, parent_id, author_name, author_email, content, created_at \
             FROM comments WHERE post_slug = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(post_slug)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_comment).collect::<Result<_, _>>()?)
    }

    async fn insert(&self, comment: NewComment) -> anyhow::Result<Comment> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO comments (post_slug, parent_id, author_name, author_email, content, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&comment.post_slug)
        .bind(comment.parent_id)
        .bind(&comment.author_name)
        .bind(&comment.author_email)
        .bind(&comment.content)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(comment.into_comment(result.last_insert_rowid(), created_at))
    }

    async fn exists_in_post(&self, post_slug: &str, id: CommentId) -> anyhow::Result<bool> {
        let exists: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM comments WHERE id = ? AND post_slug = ?)")
                .bind(id)
                .bind(post_slug)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists != 0)
    }

    async fn delete(&self, id: CommentId) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> SqliteCommentRepository {
        SqliteCommentRepository::connect("sqlite::memory:", 1)
            .await
            .expect("in-memory sqlite")
    }

    fn draft(post_slug: &str, parent_id: Option<CommentId>, content: &str) -> NewComment {
        NewComment {
            post_slug: post_slug.into(),
            parent_id,
            author_name: "Alice".into(),
            author_email: "alice@example.com".into(),
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn insert_then_list_round_trips_fields() {
        let repo = repo().await;
        let root = repo.insert(draft("post", None, "root")).await.unwrap();
        let reply = repo.insert(draft("post", Some(root.id), "reply")).await.unwrap();
        repo.insert(draft("elsewhere", None, "other post")).await.unwrap();

        let listed = repo.list_for_post("post").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, root.id);
        assert_eq!(listed[1].parent_id, Some(root.id));
        assert_eq!(listed[1].content, "reply");
        assert_eq!(listed[1].created_at, reply.created_at);
    }

    #[tokio::test]
    async fn exists_checks_post_membership() {
        let repo = repo().await;
        let root = repo.insert(draft("post", None, "root")).await.unwrap();

        assert!(repo.exists_in_post("post", root.id).await.unwrap());
        assert!(!repo.exists_in_post("other", root.id).await.unwrap());
        assert!(!repo.exists_in_post("post", root.id + 100).await.unwrap());
    }

    #[tokio::test]
    async fn delete_cascades_through_foreign_key() {
        let repo = repo().await;
        let root = repo.insert(draft("post", None, "root")).await.unwrap();
        let reply = repo.insert(draft("post", Some(root.id), "reply")).await.unwrap();
        repo.insert(draft("post", Some(reply.id), "nested")).await.unwrap();
        let survivor = repo.insert(draft("post", None, "survivor")).await.unwrap();

        assert!(repo.delete(root.id).await.unwrap());
        let listed = repo.list_for_post("post").await.unwrap();
        assert_eq!(listed.iter().map(|c| c.id).collect::<Vec<_>>(), vec![survivor.id]);

        assert!(!repo.delete(root.id).await.unwrap());
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let repo = repo().await;
        repo.migrate().await.unwrap();
        assert!(repo.list_for_post("post").await.unwrap().is_empty());
    }
}
