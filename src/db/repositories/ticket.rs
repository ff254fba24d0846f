//! Ticket repository
//!
//! Database operations for tickets.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ListParams, Priority, Ticket, TicketStatus, TicketType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const TICKET_COLUMNS: &str =
    "id, title, description, type, priority, created_at, reported_by, email_to_reply, status";

/// Ticket repository trait
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Insert a ticket, returning it with its new ID
    async fn create(&self, ticket: &Ticket) -> Result<Ticket>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Ticket>>;

    /// Write every mutable field of `ticket` back
    async fn update(&self, ticket: &Ticket) -> Result<Ticket>;

    /// Delete a ticket together with its actions
    async fn delete(&self, id: i64) -> Result<()>;

    /// Newest tickets first, optionally restricted to one status.
    /// Returns the page and the total matching count.
    async fn list(
        &self,
        status: Option<TicketStatus>,
        params: &ListParams,
    ) -> Result<(Vec<Ticket>, i64)>;

    async fn count(&self, status: Option<TicketStatus>) -> Result<i64>;
}

/// SQLx-based ticket repository implementation
pub struct SqlxTicketRepository {
    pool: DynDatabasePool,
}

impl SqlxTicketRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TicketRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TicketRepository for SqlxTicketRepository {
    async fn create(&self, ticket: &Ticket) -> Result<Ticket> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_ticket_sqlite(self.pool.sqlite()?, ticket).await,
            DatabaseDriver::Mysql => create_ticket_mysql(self.pool.mysql()?, ticket).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Ticket>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_ticket_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_ticket_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn update(&self, ticket: &Ticket) -> Result<Ticket> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_ticket_sqlite(self.pool.sqlite()?, ticket).await,
            DatabaseDriver::Mysql => update_ticket_mysql(self.pool.mysql()?, ticket).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_ticket_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => delete_ticket_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn list(
        &self,
        status: Option<TicketStatus>,
        params: &ListParams,
    ) -> Result<(Vec<Ticket>, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_tickets_sqlite(self.pool.sqlite()?, status, params).await,
            DatabaseDriver::Mysql => list_tickets_mysql(self.pool.mysql()?, status, params).await,
        }
    }

    async fn count(&self, status: Option<TicketStatus>) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_tickets_sqlite(self.pool.sqlite()?, status).await,
            DatabaseDriver::Mysql => count_tickets_mysql(self.pool.mysql()?, status).await,
        }
    }
}

/// `WHERE` clause for an optional status filter
fn status_clause(status: Option<TicketStatus>) -> &'static str {
    if status.is_some() {
        "WHERE status = ?"
    } else {
        ""
    }
}

#[allow(clippy::too_many_arguments)]
fn decode_ticket(
    id: i64,
    title: String,
    description: String,
    ticket_type: i64,
    priority: i64,
    created_at: i64,
    reported_by: i64,
    email_to_reply: String,
    status: i64,
) -> Result<Ticket> {
    Ok(Ticket {
        id,
        title,
        description,
        ticket_type: TicketType::try_from(ticket_type)
            .with_context(|| format!("Invalid type for ticket {}", id))?,
        priority: Priority::try_from(priority)
            .with_context(|| format!("Invalid priority for ticket {}", id))?,
        created_at,
        reported_by,
        email_to_reply,
        status: TicketStatus::try_from(status)
            .with_context(|| format!("Invalid status for ticket {}", id))?,
    })
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_ticket_sqlite(pool: &SqlitePool, ticket: &Ticket) -> Result<Ticket> {
    let result = sqlx::query(
        r#"
        INSERT INTO tickets (title, description, type, priority, created_at, reported_by, email_to_reply, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&ticket.title)
    .bind(&ticket.description)
    .bind(ticket.ticket_type.as_i64())
    .bind(ticket.priority.as_i64())
    .bind(ticket.created_at)
    .bind(ticket.reported_by)
    .bind(&ticket.email_to_reply)
    .bind(ticket.status.as_i64())
    .execute(pool)
    .await
    .context("Failed to create ticket")?;

    Ok(Ticket {
        id: result.last_insert_rowid(),
        ..ticket.clone()
    })
}

async fn get_ticket_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Ticket>> {
    let row = sqlx::query(&format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get ticket by ID")?;

    row.as_ref().map(row_to_ticket_sqlite).transpose()
}

async fn update_ticket_sqlite(pool: &SqlitePool, ticket: &Ticket) -> Result<Ticket> {
    sqlx::query(
        r#"
        UPDATE tickets
        SET title = ?, description = ?, type = ?, priority = ?, email_to_reply = ?, status = ?
        WHERE id = ?
        "#,
    )
    .bind(&ticket.title)
    .bind(&ticket.description)
    .bind(ticket.ticket_type.as_i64())
    .bind(ticket.priority.as_i64())
    .bind(&ticket.email_to_reply)
    .bind(ticket.status.as_i64())
    .bind(ticket.id)
    .execute(pool)
    .await
    .context("Failed to update ticket")?;

    Ok(ticket.clone())
}

async fn delete_ticket_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM tickets WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete ticket")?;

    Ok(())
}

async fn list_tickets_sqlite(
    pool: &SqlitePool,
    status: Option<TicketStatus>,
    params: &ListParams,
) -> Result<(Vec<Ticket>, i64)> {
    let sql = format!(
        "SELECT {} FROM tickets {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        TICKET_COLUMNS,
        status_clause(status)
    );
    let mut query = sqlx::query(&sql);
    if let Some(status) = status {
        query = query.bind(status.as_i64());
    }
    let rows = query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list tickets")?;

    let tickets = rows
        .iter()
        .map(row_to_ticket_sqlite)
        .collect::<Result<Vec<_>>>()?;
    let total = count_tickets_sqlite(pool, status).await?;

    Ok((tickets, total))
}

async fn count_tickets_sqlite(pool: &SqlitePool, status: Option<TicketStatus>) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) as count FROM tickets {}",
        status_clause(status)
    );
    let mut query = sqlx::query(&sql);
    if let Some(status) = status {
        query = query.bind(status.as_i64());
    }
    let row = query
        .fetch_one(pool)
        .await
        .context("Failed to count tickets")?;

    Ok(row.get("count"))
}

fn row_to_ticket_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Ticket> {
    decode_ticket(
        row.get("id"),
        row.get("title"),
        row.get("description"),
        row.get("type"),
        row.get("priority"),
        row.get("created_at"),
        row.get("reported_by"),
        row.get("email_to_reply"),
        row.get("status"),
    )
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_ticket_mysql(pool: &MySqlPool, ticket: &Ticket) -> Result<Ticket> {
    let result = sqlx::query(
        r#"
        INSERT INTO tickets (title, description, type, priority, created_at, reported_by, email_to_reply, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&ticket.title)
    .bind(&ticket.description)
    .bind(ticket.ticket_type.as_i64())
    .bind(ticket.priority.as_i64())
    .bind(ticket.created_at)
    .bind(ticket.reported_by)
    .bind(&ticket.email_to_reply)
    .bind(ticket.status.as_i64())
    .execute(pool)
    .await
    .context("Failed to create ticket")?;

    Ok(Ticket {
        id: result.last_insert_id() as i64,
        ..ticket.clone()
    })
}

async fn get_ticket_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Ticket>> {
    let row = sqlx::query(&format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get ticket by ID")?;

    row.as_ref().map(row_to_ticket_mysql).transpose()
}

async fn update_ticket_mysql(pool: &MySqlPool, ticket: &Ticket) -> Result<Ticket> {
    sqlx::query(
        r#"
        UPDATE tickets
        SET title = ?, description = ?, type = ?, priority = ?, email_to_reply = ?, status = ?
        WHERE id = ?
        "#,
    )
    .bind(&ticket.title)
    .bind(&ticket.description)
    .bind(ticket.ticket_type.as_i64())
    .bind(ticket.priority.as_i64())
    .bind(&ticket.email_to_reply)
    .bind(ticket.status.as_i64())
    .bind(ticket.id)
    .execute(pool)
    .await
    .context("Failed to update ticket")?;

    Ok(ticket.clone())
}

async fn delete_ticket_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM tickets WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete ticket")?;

    Ok(())
}

async fn list_tickets_mysql(
    pool: &MySqlPool,
    status: Option<TicketStatus>,
    params: &ListParams,
) -> Result<(Vec<Ticket>, i64)> {
    let sql = format!(
        "SELECT {} FROM tickets {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        TICKET_COLUMNS,
        status_clause(status)
    );
    let mut query = sqlx::query(&sql);
    if let Some(status) = status {
        query = query.bind(status.as_i64());
    }
    let rows = query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list tickets")?;

    let tickets = rows
        .iter()
        .map(row_to_ticket_mysql)
        .collect::<Result<Vec<_>>>()?;
    let total = count_tickets_mysql(pool, status).await?;

    Ok((tickets, total))
}

async fn count_tickets_mysql(pool: &MySqlPool, status: Option<TicketStatus>) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) as count FROM tickets {}",
        status_clause(status)
    );
    let mut query = sqlx::query(&sql);
    if let Some(status) = status {
        query = query.bind(status.as_i64());
    }
    let row = query
        .fetch_one(pool)
        .await
        .context("Failed to count tickets")?;

    Ok(row.get("count"))
}

fn row_to_ticket_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Ticket> {
    decode_ticket(
        row.get("id"),
        row.get("title"),
        row.get("description"),
        row.get("type"),
        row.get("priority"),
        row.get("created_at"),
        row.get("reported_by"),
        row.get("email_to_reply"),
        row.get("status"),
    )
}
