//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories. They own
//! validation, the session life cycle and the ticket workflow.

pub mod i18n;
pub mod mail;
pub mod password;
pub mod session;
pub mod ticket;
pub mod user;

pub use i18n::Translator;
pub use mail::{build_mailer, DynMailer, LogMailer, Mailer, MemoryMailer, OutgoingMail, SmtpMailer};
pub use password::{hash_password, verify_password};
pub use session::{CookieSigner, SessionManager};
pub use ticket::{TicketDetails, TicketService, TicketServiceError};
pub use user::{AuthError, UserService, UserServiceError};
