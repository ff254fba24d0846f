//! Session repository
//!
//! Database operations for login sessions. Expiry is never checked here;
//! callers pass the current time where it matters.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a session. `session.id` is ignored and assigned by the database.
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by token, expired or not
    async fn find_by_token(&self, token: &str) -> Result<Option<Session>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Session>>;

    /// Delete a session. Returns whether a row was removed.
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Delete all sessions for a user
    async fn delete_by_user(&self, user_id: i64) -> Result<u64>;

    /// Delete sessions whose expiration is at or before `now`
    async fn delete_expired(&self, now: i64) -> Result<u64>;
}

/// SQLx-based session repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_session_sqlite(self.pool.sqlite()?, session).await,
            DatabaseDriver::Mysql => create_session_mysql(self.pool.mysql()?, session).await,
        }
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Session>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                find_session_by_token_sqlite(self.pool.sqlite()?, token).await
            }
            DatabaseDriver::Mysql => find_session_by_token_mysql(self.pool.mysql()?, token).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Session>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_session_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_session_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("DELETE FROM sessions WHERE id = ?")
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to delete session")?
                    .rows_affected()
            }
            DatabaseDriver::Mysql => {
                sqlx::query("DELETE FROM sessions WHERE id = ?")
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to delete session")?
                    .rows_affected()
            }
        };
        Ok(affected > 0)
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64> {
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM sessions WHERE user_id = ?")
                .bind(user_id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query("DELETE FROM sessions WHERE user_id = ?")
                .bind(user_id)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        };
        result.context("Failed to delete sessions by user")
    }

    async fn delete_expired(&self, now: i64) -> Result<u64> {
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM sessions WHERE expiration <= ?")
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query("DELETE FROM sessions WHERE expiration <= ?")
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        };
        result.context("Failed to delete expired sessions")
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_session_sqlite(pool: &SqlitePool, session: &Session) -> Result<Session> {
    let result =
        sqlx::query("INSERT INTO sessions (user_id, expiration, token) VALUES (?, ?, ?)")
            .bind(session.user_id)
            .bind(session.expiration)
            .bind(&session.token)
            .execute(pool)
            .await
            .context("Failed to create session")?;

    Ok(Session {
        id: result.last_insert_rowid(),
        ..session.clone()
    })
}

async fn find_session_by_token_sqlite(pool: &SqlitePool, token: &str) -> Result<Option<Session>> {
    let row = sqlx::query("SELECT id, user_id, expiration, token FROM sessions WHERE token = ?")
        .bind(token)
        .fetch_optional(pool)
        .await
        .context("Failed to find session by token")?;

    Ok(row.as_ref().map(row_to_session_sqlite))
}

async fn get_session_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Session>> {
    let row = sqlx::query("SELECT id, user_id, expiration, token FROM sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get session by ID")?;

    Ok(row.as_ref().map(row_to_session_sqlite))
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> Session {
    Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        expiration: row.get("expiration"),
        token: row.get("token"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_session_mysql(pool: &MySqlPool, session: &Session) -> Result<Session> {
    let result =
        sqlx::query("INSERT INTO sessions (user_id, expiration, token) VALUES (?, ?, ?)")
            .bind(session.user_id)
            .bind(session.expiration)
            .bind(&session.token)
            .execute(pool)
            .await
            .context("Failed to create session")?;

    Ok(Session {
        id: result.last_insert_id() as i64,
        ..session.clone()
    })
}

async fn find_session_by_token_mysql(pool: &MySqlPool, token: &str) -> Result<Option<Session>> {
    let row = sqlx::query("SELECT id, user_id, expiration, token FROM sessions WHERE token = ?")
        .bind(token)
        .fetch_optional(pool)
        .await
        .context("Failed to find session by token")?;

    Ok(row.as_ref().map(row_to_session_mysql))
}

async fn get_session_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Session>> {
    let row = sqlx::query("SELECT id, user_id, expiration, token FROM sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get session by ID")?;

    Ok(row.as_ref().map(row_to_session_mysql))
}

fn row_to_session_mysql(row: &sqlx::mysql::MySqlRow) -> Session {
    Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        expiration: row.get("expiration"),
        token: row.get("token"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxSessionRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxSessionRepository::new(pool.clone());
        (pool, repo)
    }

    // Sessions need an owning user for the foreign key
    async fn create_test_user(pool: &DynDatabasePool, id: i64) {
        sqlx::query("INSERT INTO users (id, name, password, type) VALUES (?, ?, 'hash', 0)")
            .bind(id)
            .bind(format!("user{}", id))
            .execute(pool.sqlite().unwrap())
            .await
            .expect("Failed to create test user");
    }

    fn test_session(user_id: i64, token: &str, expiration: i64) -> Session {
        Session {
            id: 0,
            user_id,
            expiration,
            token: token.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find_by_token() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, 42).await;

        let created = repo.create(&test_session(42, "abc123", 2_000)).await.unwrap();
        assert!(created.id > 0);

        let found = repo.find_by_token("abc123").await.unwrap().unwrap();
        assert_eq!(found, created);
        assert!(repo.find_by_token("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_token_ignores_expiry() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, 1).await;

        repo.create(&test_session(1, "old", 10)).await.unwrap();
        assert!(repo.find_by_token("old").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, 1).await;

        let session = repo.create(&test_session(1, "t", 2_000)).await.unwrap();
        assert!(repo.delete(session.id).await.unwrap());
        assert!(!repo.delete(session.id).await.unwrap());
        assert!(repo.get_by_id(session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_by_user() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, 1).await;
        create_test_user(&pool, 2).await;

        repo.create(&test_session(1, "a", 2_000)).await.unwrap();
        repo.create(&test_session(1, "b", 2_000)).await.unwrap();
        repo.create(&test_session(2, "c", 2_000)).await.unwrap();

        assert_eq!(repo.delete_by_user(1).await.unwrap(), 2);
        assert!(repo.find_by_token("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, 1).await;

        repo.create(&test_session(1, "past", 99)).await.unwrap();
        repo.create(&test_session(1, "edge", 100)).await.unwrap();
        repo.create(&test_session(1, "future", 101)).await.unwrap();

        assert_eq!(repo.delete_expired(100).await.unwrap(), 2);
        assert!(repo.find_by_token("future").await.unwrap().is_some());
        assert!(repo.find_by_token("edge").await.unwrap().is_none());
    }
}
