//! Named routes
//!
//! Handlers never build paths by hand; they ask [`Links`] for the path of a
//! [`Route`], which takes the mount prefix into account.

/// Every page a handler may link or redirect to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Login,
    Logout,
    Me,
    Users,
    User(i64),
    Tickets,
    Ticket(i64),
    TicketActions(i64),
}

impl Route {
    /// Path relative to the application root
    fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Login => "/login".to_string(),
            Route::Logout => "/logout".to_string(),
            Route::Me => "/me".to_string(),
            Route::Users => "/users".to_string(),
            Route::User(id) => format!("/users/{}", id),
            Route::Tickets => "/tickets".to_string(),
            Route::Ticket(id) => format!("/tickets/{}", id),
            Route::TicketActions(id) => format!("/tickets/{}/actions", id),
        }
    }
}

/// Resolves routes to paths under an optional mount prefix
#[derive(Debug, Clone, Default)]
pub struct Links {
    prefix: String,
}

impl Links {
    /// `prefix` like `/helpdesk`; empty or `/` means mounted at the root.
    pub fn new(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        let prefix = if prefix.is_empty() || prefix.starts_with('/') {
            prefix.to_string()
        } else {
            format!("/{}", prefix)
        };
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn link_to(&self, route: Route) -> String {
        match (self.prefix.is_empty(), route) {
            (true, route) => route.path(),
            (false, Route::Home) => self.prefix.clone(),
            (false, route) => format!("{}{}", self.prefix, route.path()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links_at_root() {
        let links = Links::new("");
        assert_eq!(links.link_to(Route::Home), "/");
        assert_eq!(links.link_to(Route::Ticket(7)), "/tickets/7");
        assert_eq!(links.link_to(Route::TicketActions(7)), "/tickets/7/actions");
    }

    #[test]
    fn test_links_with_prefix() {
        let links = Links::new("helpdesk/");
        assert_eq!(links.prefix(), "/helpdesk");
        assert_eq!(links.link_to(Route::Home), "/helpdesk");
        assert_eq!(links.link_to(Route::Login), "/helpdesk/login");
        assert_eq!(links.link_to(Route::User(3)), "/helpdesk/users/3");
    }

    #[test]
    fn test_slash_prefix_is_root() {
        assert_eq!(Links::new("/").link_to(Route::Home), "/");
    }
}
