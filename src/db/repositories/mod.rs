//! Database repositories
//!
//! One repository per entity. Each is a trait with a `Sqlx*` implementation
//! that dispatches on the configured driver.

pub mod action;
pub mod session;
pub mod ticket;
pub mod user;

pub use action::{ActionRepository, SqlxActionRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use ticket::{SqlxTicketRepository, TicketRepository};
pub use user::{SqlxUserRepository, UserRepository};
