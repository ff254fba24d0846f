//! User repository
//!
//! Database operations for help desk users.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{User, UserType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user, returning it with its new ID
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Look a user up by login name
    async fn get_by_name(&self, name: &str) -> Result<Option<User>>;

    /// Delete a user. Their sessions go with them.
    async fn delete(&self, id: i64) -> Result<()>;

    async fn count(&self) -> Result<i64>;

    /// Whether the user reported a ticket or performed an action
    async fn has_history(&self, id: i64) -> Result<bool>;

    /// All users ordered by name
    async fn list(&self) -> Result<Vec<User>>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_user_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_name_sqlite(self.pool.sqlite()?, name).await,
            DatabaseDriver::Mysql => get_user_by_name_mysql(self.pool.mysql()?, name).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_user_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => delete_user_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_users_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => count_users_mysql(self.pool.mysql()?).await,
        }
    }

    async fn has_history(&self, id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => has_history_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => has_history_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn list(&self) -> Result<Vec<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_users_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => list_users_mysql(self.pool.mysql()?).await,
        }
    }
}

const HISTORY_SQL: &str = "SELECT EXISTS(SELECT 1 FROM tickets WHERE reported_by = ?) \
     OR EXISTS(SELECT 1 FROM actions WHERE user_id = ?) AS has_history";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let result = sqlx::query("INSERT INTO users (name, password, type) VALUES (?, ?, ?)")
        .bind(&user.name)
        .bind(&user.password)
        .bind(user.user_type.as_i64())
        .execute(pool)
        .await
        .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        ..user.clone()
    })
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, name, password, type FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn get_user_by_name_sqlite(pool: &SqlitePool, name: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, name, password, type FROM users WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by name")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn delete_user_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete user")?;

    Ok(())
}

async fn count_users_sqlite(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn has_history_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let row = sqlx::query(HISTORY_SQL)
        .bind(id)
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to check user history")?;

    let has_history: i64 = row.get("has_history");
    Ok(has_history != 0)
}

async fn list_users_sqlite(pool: &SqlitePool) -> Result<Vec<User>> {
    let rows = sqlx::query("SELECT id, name, password, type FROM users ORDER BY name")
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    rows.iter().map(row_to_user_sqlite).collect()
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let user_type: i64 = row.get("type");
    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        password: row.get("password"),
        user_type: UserType::try_from(user_type)
            .with_context(|| format!("Invalid user type in database: {}", user_type))?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let result = sqlx::query("INSERT INTO users (name, password, type) VALUES (?, ?, ?)")
        .bind(&user.name)
        .bind(&user.password)
        .bind(user.user_type.as_i64())
        .execute(pool)
        .await
        .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        ..user.clone()
    })
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, name, password, type FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn get_user_by_name_mysql(pool: &MySqlPool, name: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, name, password, type FROM users WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by name")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn delete_user_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete user")?;

    Ok(())
}

async fn count_users_mysql(pool: &MySqlPool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn has_history_mysql(pool: &MySqlPool, id: i64) -> Result<bool> {
    let row = sqlx::query(HISTORY_SQL)
        .bind(id)
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to check user history")?;

    let has_history: i64 = row.get("has_history");
    Ok(has_history != 0)
}

async fn list_users_mysql(pool: &MySqlPool) -> Result<Vec<User>> {
    let rows = sqlx::query("SELECT id, name, password, type FROM users ORDER BY name")
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    rows.iter().map(row_to_user_mysql).collect()
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let user_type: i64 = row.get("type");
    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        password: row.get("password"),
        user_type: UserType::try_from(user_type)
            .with_context(|| format!("Invalid user type in database: {}", user_type))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn test_user(name: &str, user_type: UserType) -> User {
        User::new(name.to_string(), "hash".to_string(), user_type)
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let repo = setup_test_repo().await;

        let created = repo.create(&test_user("ana", UserType::Admin)).await.unwrap();
        assert!(created.id > 0);

        let found = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.name, "ana");
        assert_eq!(found.user_type, UserType::Admin);
        assert_eq!(found.password, "hash");
    }

    #[tokio::test]
    async fn test_get_by_name() {
        let repo = setup_test_repo().await;
        repo.create(&test_user("ana", UserType::Agent)).await.unwrap();

        assert!(repo.get_by_name("ana").await.unwrap().is_some());
        assert!(repo.get_by_name("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let repo = setup_test_repo().await;
        repo.create(&test_user("ana", UserType::Agent)).await.unwrap();
        assert!(repo.create(&test_user("ana", UserType::Admin)).await.is_err());
    }

    #[tokio::test]
    async fn test_count_list_delete() {
        let repo = setup_test_repo().await;
        assert_eq!(repo.count().await.unwrap(), 0);

        let bob = repo.create(&test_user("bob", UserType::Agent)).await.unwrap();
        repo.create(&test_user("ana", UserType::Agent)).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);

        let names: Vec<_> = repo.list().await.unwrap().into_iter().map(|u| u.name).collect();
        assert_eq!(names, vec!["ana", "bob"]);

        repo.delete(bob.id).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);
        assert!(repo.get_by_id(bob.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_has_history() {
        let repo = setup_test_repo().await;
        let ana = repo.create(&test_user("ana", UserType::Agent)).await.unwrap();
        let bob = repo.create(&test_user("bob", UserType::Agent)).await.unwrap();
        assert!(!repo.has_history(ana.id).await.unwrap());

        let pool = repo.pool.sqlite().unwrap();
        sqlx::query(
            "INSERT INTO tickets (title, created_at, reported_by, email_to_reply) \
             VALUES ('Help', 0, ?, 'x@example.com')",
        )
        .bind(ana.id)
        .execute(pool)
        .await
        .unwrap();
        assert!(repo.has_history(ana.id).await.unwrap());
        assert!(!repo.has_history(bob.id).await.unwrap());

        sqlx::query(
            "INSERT INTO actions (user_id, ticket_id, timestamp, type, priority, new_priority) \
             VALUES (?, 1, 0, 1, 1, 1)",
        )
        .bind(bob.id)
        .execute(pool)
        .await
        .unwrap();
        assert!(repo.has_history(bob.id).await.unwrap());
    }
}
