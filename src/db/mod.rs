mod comments;
mod posts;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

pub use comments::{Comment, CommentStore};
pub use posts::{Post, PostStore};
pub use user::{Author, CreateUserError, PublicUser, User, UserStore};

/// Value of `PRAGMA user_version` once [`SCHEMA`] has been applied.
const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &[&str] = &[
    // Users table. refresh_token/token_expiry are NULL without an active session.
    "CREATE TABLE users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT UNIQUE NOT NULL,
        email TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        refresh_token TEXT,
        token_expiry INTEGER,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    )",
    "CREATE UNIQUE INDEX idx_users_refresh_token ON users(refresh_token)",
    // Posts table
    "CREATE TABLE posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    )",
    "CREATE INDEX idx_posts_author_id ON posts(author_id)",
    "CREATE INDEX idx_posts_created_at ON posts(created_at)",
    // Comments table
    "CREATE TABLE comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        content TEXT NOT NULL,
        post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    )",
    "CREATE INDEX idx_comments_post_id ON comments(post_id)",
];

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        // sqlx turns on foreign_keys for every SQLite connection by default.
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Create the schema on a fresh database. Already migrated databases are
    /// left untouched.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let (version,): (i64,) = sqlx::query_as("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        if version >= SCHEMA_VERSION {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&mut *tx).await?;
        }
        // user_version is stored in the file header and commits with the schema.
        sqlx::query("PRAGMA user_version = 1")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(version = SCHEMA_VERSION, "Database schema created");
        Ok(())
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the posts store.
    pub fn posts(&self) -> PostStore {
        PostStore::new(self.pool.clone())
    }

    /// Get the comments store.
    pub fn comments(&self) -> CommentStore {
        CommentStore::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn user_version(db: &Database) -> i64 {
        let (version,): (i64,) = sqlx::query_as("PRAGMA user_version")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        version
    }

    #[tokio::test]
    async fn test_schema_version_is_recorded() {
        let db = Database::open(":memory:").await.unwrap();
        assert_eq!(user_version(&db).await, SCHEMA_VERSION);

        // Re-running is a no-op
        db.migrate().await.unwrap();
        assert_eq!(user_version(&db).await, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_reopening_file_keeps_data() {
        let path = std::env::temp_dir().join(format!("microblog-{}.db", uuid::Uuid::new_v4()));
        let path = path.to_str().unwrap().to_string();

        let db = Database::open(&path).await.unwrap();
        db.users()
            .create("alice", "alice@x.com", "hash")
            .await
            .unwrap();
        db.pool.close().await;

        let db = Database::open(&path).await.unwrap();
        assert!(db.users().get_by_username("alice").await.unwrap().is_some());
        db.pool.close().await;

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_deleting_post_removes_comments() {
        let db = Database::open(":memory:").await.unwrap();

        let user_id = db
            .users()
            .create("alice", "alice@x.com", "hash")
            .await
            .unwrap();
        let post_id = db.posts().create(user_id, "Title", "Body").await.unwrap();
        let comment_id = db
            .comments()
            .create(post_id, user_id, "First")
            .await
            .unwrap();

        assert!(db.posts().delete(post_id).await.unwrap());
        assert!(db.comments().get_by_id(comment_id).await.unwrap().is_none());
    }
}
