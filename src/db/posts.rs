//! Post storage. Reads join in the author and a comment count.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;

use super::Author;

#[derive(Clone)]
pub struct PostStore {
    pool: SqlitePool,
}

/// A post as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub author: Author,
    pub comments_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    title: String,
    content: String,
    author_id: i64,
    author_username: String,
    comments_count: i64,
    created_at: String,
    updated_at: String,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            content: row.content,
            author_id: row.author_id,
            author: Author {
                id: row.author_id,
                username: row.author_username,
            },
            comments_count: row.comments_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PostStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new post. Returns the post ID.
    pub async fn create(
        &self,
        author_id: i64,
        title: &str,
        content: &str,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO posts (title, content, author_id) VALUES (?, ?, ?)")
            .bind(title)
            .bind(content)
            .bind(author_id)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a post by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Post>, sqlx::Error> {
        let row: Option<PostRow> = sqlx::query_as(
            "SELECT p.id, p.title, p.content, p.author_id,
                    u.username AS author_username,
                    (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comments_count,
                    p.created_at, p.updated_at
             FROM posts p JOIN users u ON u.id = p.author_id
             WHERE p.id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Post::from))
    }

    /// List all posts, newest first.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Post>, sqlx::Error> {
        let rows: Vec<PostRow> = sqlx::query_as(
            "SELECT p.id, p.title, p.content, p.author_id,
                    u.username AS author_username,
                    (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comments_count,
                    p.created_at, p.updated_at
             FROM posts p JOIN users u ON u.id = p.author_id
             ORDER BY p.created_at DESC, p.id DESC
             LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    /// List one author's posts, newest first.
    pub async fn list_by_author(
        &self,
        author_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, sqlx::Error> {
        let rows: Vec<PostRow> = sqlx::query_as(
            "SELECT p.id, p.title, p.content, p.author_id,
                    u.username AS author_username,
                    (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comments_count,
                    p.created_at, p.updated_at
             FROM posts p JOIN users u ON u.id = p.author_id
             WHERE p.author_id = ?
             ORDER BY p.created_at DESC, p.id DESC
             LIMIT ? OFFSET ?",
        )
        .bind(author_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    /// Update a post's title and content.
    /// Returns true if the post was found and updated.
    pub async fn update(&self, id: i64, title: &str, content: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE posts SET title = ?, content = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(title)
        .bind(content)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a post and, through the foreign key, its comments.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Check whether a post exists.
    pub async fn exists(&self, id: i64) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    async fn setup() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let user_id = db
            .users()
            .create("alice", "alice@x.com", "hash")
            .await
            .unwrap();
        (db, user_id)
    }

    #[tokio::test]
    async fn test_create_and_get_post() {
        let (db, user_id) = setup().await;

        let id = db.posts().create(user_id, "Hello", "World").await.unwrap();
        let post = db.posts().get_by_id(id).await.unwrap().unwrap();

        assert_eq!(post.title, "Hello");
        assert_eq!(post.content, "World");
        assert_eq!(post.author_id, user_id);
        assert_eq!(post.author.username, "alice");
        assert_eq!(post.comments_count, 0);

        assert!(db.posts().get_by_id(id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first_with_paging() {
        let (db, user_id) = setup().await;

        let first = db.posts().create(user_id, "First", "1").await.unwrap();
        let second = db.posts().create(user_id, "Second", "2").await.unwrap();
        let third = db.posts().create(user_id, "Third", "3").await.unwrap();

        let posts = db.posts().list(10, 0).await.unwrap();
        let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![third, second, first]);

        let page = db.posts().list(1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, second);
    }

    #[tokio::test]
    async fn test_list_by_author() {
        let (db, alice) = setup().await;
        let bob = db.users().create("bob", "bob@x.com", "hash").await.unwrap();

        db.posts().create(alice, "Alice post", "a").await.unwrap();
        let bob_post = db.posts().create(bob, "Bob post", "b").await.unwrap();

        let posts = db.posts().list_by_author(bob, 10, 0).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, bob_post);
        assert_eq!(posts[0].author.username, "bob");
    }

    #[tokio::test]
    async fn test_update_post() {
        let (db, user_id) = setup().await;

        let id = db.posts().create(user_id, "Old", "old").await.unwrap();
        assert!(db.posts().update(id, "New", "new").await.unwrap());

        let post = db.posts().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(post.title, "New");
        assert_eq!(post.content, "new");

        assert!(!db.posts().update(id + 1, "x", "y").await.unwrap());
    }

    #[tokio::test]
    async fn test_comments_count() {
        let (db, user_id) = setup().await;

        let id = db.posts().create(user_id, "Title", "Body").await.unwrap();
        db.comments().create(id, user_id, "one").await.unwrap();
        db.comments().create(id, user_id, "two").await.unwrap();

        let post = db.posts().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(post.comments_count, 2);
    }

    #[tokio::test]
    async fn test_delete_post() {
        let (db, user_id) = setup().await;

        let id = db.posts().create(user_id, "Title", "Body").await.unwrap();
        assert!(db.posts().exists(id).await.unwrap());

        assert!(db.posts().delete(id).await.unwrap());
        assert!(!db.posts().exists(id).await.unwrap());
        assert!(!db.posts().delete(id).await.unwrap());
    }
}
