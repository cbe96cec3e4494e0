//! Comment storage.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;

use super::Author;

#[derive(Clone)]
pub struct CommentStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub post_id: i64,
    pub author_id: i64,
    pub author: Author,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    content: String,
    post_id: i64,
    author_id: i64,
    author_username: String,
    created_at: String,
    updated_at: String,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            content: row.content,
            post_id: row.post_id,
            author_id: row.author_id,
            author: Author {
                id: row.author_id,
                username: row.author_username,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl CommentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a comment on a post. Returns the comment ID.
    pub async fn create(
        &self,
        post_id: i64,
        author_id: i64,
        content: &str,
    ) -> Result<i64, sqlx::Error> {
        let result =
            sqlx::query("INSERT INTO comments (content, post_id, author_id) VALUES (?, ?, ?)")
                .bind(content)
                .bind(post_id)
                .bind(author_id)
                .execute(&self.pool)
                .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Comment>, sqlx::Error> {
        let row: Option<CommentRow> = sqlx::query_as(
            "SELECT c.id, c.content, c.post_id, c.author_id,
                    u.username AS author_username,
                    c.created_at, c.updated_at
             FROM comments c JOIN users u ON u.id = c.author_id
             WHERE c.id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Comment::from))
    }

    /// List a post's comments, oldest first.
    pub async fn list_by_post(
        &self,
        post_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Comment>, sqlx::Error> {
        let rows: Vec<CommentRow> = sqlx::query_as(
            "SELECT c.id, c.content, c.post_id, c.author_id,
                    u.username AS author_username,
                    c.created_at, c.updated_at
             FROM comments c JOIN users u ON u.id = c.author_id
             WHERE c.post_id = ?
             ORDER BY c.created_at ASC, c.id ASC
             LIMIT ? OFFSET ?",
        )
        .bind(post_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    /// Replace a comment's content. Returns true if the comment exists.
    pub async fn update(&self, id: i64, content: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE comments SET content = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(content)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
