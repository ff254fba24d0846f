//! Session model

use serde::{Deserialize, Serialize};

/// A login session. One row per login, removed on logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Expiration as unix seconds
    pub expiration: i64,
    /// Opaque token carried by the session cookie
    #[serde(skip_serializing)]
    pub token: String,
}

impl Session {
    /// A session is valid strictly before its expiration.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expiration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expiration: i64) -> Session {
        Session {
            id: 1,
            user_id: 42,
            expiration,
            token: "abc123".to_string(),
        }
    }

    #[test]
    fn test_is_expired_boundary() {
        let s = session(1_000);
        assert!(!s.is_expired(999));
        assert!(s.is_expired(1_000));
        assert!(s.is_expired(1_001));
    }
}
