//! Action repository
//!
//! Database operations for the ticket audit trail.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Action, ActionType, Priority};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Action repository trait
#[async_trait]
pub trait ActionRepository: Send + Sync {
    /// Record an action, returning it with its new ID
    async fn create(&self, action: &Action) -> Result<Action>;

    /// Actions of a ticket in the order they happened
    async fn list_by_ticket(&self, ticket_id: i64) -> Result<Vec<Action>>;

    /// Actions performed by a user, newest first
    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Action>>;

    async fn delete_by_ticket(&self, ticket_id: i64) -> Result<u64>;
}

/// SQLx-based action repository implementation
pub struct SqlxActionRepository {
    pool: DynDatabasePool,
}

impl SqlxActionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ActionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ActionRepository for SqlxActionRepository {
    async fn create(&self, action: &Action) -> Result<Action> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_action_sqlite(self.pool.sqlite()?, action).await,
            DatabaseDriver::Mysql => create_action_mysql(self.pool.mysql()?, action).await,
        }
    }

    async fn list_by_ticket(&self, ticket_id: i64) -> Result<Vec<Action>> {
        let sql = "SELECT id, user_id, ticket_id, timestamp, type, priority, new_priority, comment \
                   FROM actions WHERE ticket_id = ? ORDER BY timestamp ASC, id ASC";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_actions_sqlite(self.pool.sqlite()?, sql, ticket_id).await,
            DatabaseDriver::Mysql => list_actions_mysql(self.pool.mysql()?, sql, ticket_id).await,
        }
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Action>> {
        let sql = "SELECT id, user_id, ticket_id, timestamp, type, priority, new_priority, comment \
                   FROM actions WHERE user_id = ? ORDER BY timestamp DESC, id DESC";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_actions_sqlite(self.pool.sqlite()?, sql, user_id).await,
            DatabaseDriver::Mysql => list_actions_mysql(self.pool.mysql()?, sql, user_id).await,
        }
    }

    async fn delete_by_ticket(&self, ticket_id: i64) -> Result<u64> {
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM actions WHERE ticket_id = ?")
                .bind(ticket_id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query("DELETE FROM actions WHERE ticket_id = ?")
                .bind(ticket_id)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        };
        result.context("Failed to delete actions by ticket")
    }
}

fn decode_action(
    id: i64,
    user_id: i64,
    ticket_id: i64,
    timestamp: i64,
    codes: (i64, i64, i64),
    comment: String,
) -> Result<Action> {
    let (action_type, priority, new_priority) = codes;
    Ok(Action {
        id,
        user_id,
        ticket_id,
        timestamp,
        action_type: ActionType::try_from(action_type)
            .with_context(|| format!("Invalid type for action {}", id))?,
        priority: Priority::try_from(priority)
            .with_context(|| format!("Invalid priority for action {}", id))?,
        new_priority: Priority::try_from(new_priority)
            .with_context(|| format!("Invalid new priority for action {}", id))?,
        comment,
    })
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_action_sqlite(pool: &SqlitePool, action: &Action) -> Result<Action> {
    let result = sqlx::query(
        r#"
        INSERT INTO actions (user_id, ticket_id, timestamp, type, priority, new_priority, comment)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(action.user_id)
    .bind(action.ticket_id)
    .bind(action.timestamp)
    .bind(action.action_type.as_i64())
    .bind(action.priority.as_i64())
    .bind(action.new_priority.as_i64())
    .bind(&action.comment)
    .execute(pool)
    .await
    .context("Failed to create action")?;

    Ok(Action {
        id: result.last_insert_rowid(),
        ..action.clone()
    })
}

async fn list_actions_sqlite(pool: &SqlitePool, sql: &str, key: i64) -> Result<Vec<Action>> {
    let rows = sqlx::query(sql)
        .bind(key)
        .fetch_all(pool)
        .await
        .context("Failed to list actions")?;

    rows.iter().map(row_to_action_sqlite).collect()
}

fn row_to_action_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Action> {
    decode_action(
        row.get("id"),
        row.get("user_id"),
        row.get("ticket_id"),
        row.get("timestamp"),
        (row.get("type"), row.get("priority"), row.get("new_priority")),
        row.get("comment"),
    )
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_action_mysql(pool: &MySqlPool, action: &Action) -> Result<Action> {
    let result = sqlx::query(
        r#"
        INSERT INTO actions (user_id, ticket_id, timestamp, type, priority, new_priority, comment)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(action.user_id)
    .bind(action.ticket_id)
    .bind(action.timestamp)
    .bind(action.action_type.as_i64())
    .bind(action.priority.as_i64())
    .bind(action.new_priority.as_i64())
    .bind(&action.comment)
    .execute(pool)
    .await
    .context("Failed to create action")?;

    Ok(Action {
        id: result.last_insert_id() as i64,
        ..action.clone()
    })
}

async fn list_actions_mysql(pool: &MySqlPool, sql: &str, key: i64) -> Result<Vec<Action>> {
    let rows = sqlx::query(sql)
        .bind(key)
        .fetch_all(pool)
        .await
        .context("Failed to list actions")?;

    rows.iter().map(row_to_action_mysql).collect()
}

fn row_to_action_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Action> {
    decode_action(
        row.get("id"),
        row.get("user_id"),
        row.get("ticket_id"),
        row.get("timestamp"),
        (row.get("type"), row.get("priority"), row.get("new_priority")),
        row.get("comment"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxActionRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let sqlite = pool.sqlite().unwrap();
        sqlx::query("INSERT INTO users (id, name, password, type) VALUES (1, 'ana', 'h', 0), (2, 'bob', 'h', 0)")
            .execute(sqlite)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO tickets (id, title, description, type, priority, created_at, reported_by, email_to_reply, status) \
             VALUES (10, 'a', '', 0, 1, 0, 1, 'x@y.z', 0), (11, 'b', '', 0, 1, 0, 1, 'x@y.z', 0)",
        )
        .execute(sqlite)
        .await
        .unwrap();
        SqlxActionRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_list_by_ticket() {
        let repo = setup_test_repo().await;

        repo.create(&Action::new(ActionType::Created, 1, 10, Priority::Normal, String::new(), 100))
            .await
            .unwrap();
        repo.create(&Action::priority_change(2, 10, Priority::Normal, Priority::Urgent, 200))
            .await
            .unwrap();
        repo.create(&Action::new(ActionType::Comment, 1, 11, Priority::Normal, "other".into(), 150))
            .await
            .unwrap();

        let actions = repo.list_by_ticket(10).await.unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action_type, ActionType::Created);
        assert_eq!(actions[1].action_type, ActionType::PriorityChange);
        assert_eq!(actions[1].priority, Priority::Normal);
        assert_eq!(actions[1].new_priority, Priority::Urgent);
    }

    #[tokio::test]
    async fn test_list_by_user_newest_first() {
        let repo = setup_test_repo().await;

        repo.create(&Action::new(ActionType::Comment, 1, 10, Priority::Low, "first".into(), 100))
            .await
            .unwrap();
        repo.create(&Action::new(ActionType::Comment, 1, 11, Priority::Low, "second".into(), 200))
            .await
            .unwrap();

        let actions = repo.list_by_user(1).await.unwrap();
        assert_eq!(actions[0].comment, "second");
        assert!(repo.list_by_user(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_ticket() {
        let repo = setup_test_repo().await;
        repo.create(&Action::new(ActionType::Comment, 1, 10, Priority::Low, "x".into(), 100))
            .await
            .unwrap();

        assert_eq!(repo.delete_by_ticket(10).await.unwrap(), 1);
        assert_eq!(repo.delete_by_ticket(10).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_action_requires_existing_ticket() {
        let repo = setup_test_repo().await;
        let result = repo
            .create(&Action::new(ActionType::Comment, 1, 999, Priority::Low, "x".into(), 100))
            .await;
        assert!(result.is_err());
    }
}
