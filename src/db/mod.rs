//! Database layer
//!
//! Storage for users, sessions, tickets and actions. Two backends are
//! supported:
//! - SQLite (default, single file next to the binary)
//! - MySQL
//!
//! The backend is selected from configuration. Code above this layer only
//! sees the `DatabasePool` trait and the repository traits.
//!
//! # Usage
//!
//! ```ignore
//! use roberts::config::DatabaseConfig;
//! use roberts::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
