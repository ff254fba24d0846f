//! Data models
//!
//! Database entities of the help desk (User, Session, Ticket, Action) and the
//! input and pagination types passed between the API and the services.

mod action;
mod pagination;
mod session;
mod ticket;
mod user;

pub use action::{Action, ActionType};
pub use pagination::{ListParams, PagedResult};
pub use session::Session;
pub use ticket::{CreateTicketInput, Priority, Ticket, TicketStatus, TicketType, UpdateTicketInput};
pub use user::{CreateUserInput, User, UserType};
