//! Action model
//!
//! Audit trail of a ticket: one row per change, comment or reply.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Priority;

/// A recorded change to a ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: i64,
    /// User who performed the action
    pub user_id: i64,
    pub ticket_id: i64,
    /// Unix seconds
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Ticket priority before the action
    pub priority: Priority,
    /// Ticket priority after the action
    pub new_priority: Priority,
    pub comment: String,
}

impl Action {
    /// An action that leaves the priority as it is.
    pub fn new(
        action_type: ActionType,
        user_id: i64,
        ticket_id: i64,
        priority: Priority,
        comment: String,
        timestamp: i64,
    ) -> Self {
        Self {
            id: 0,
            user_id,
            ticket_id,
            timestamp,
            action_type,
            priority,
            new_priority: priority,
            comment,
        }
    }

    /// A priority change from `old` to `new`.
    pub fn priority_change(
        user_id: i64,
        ticket_id: i64,
        old: Priority,
        new: Priority,
        timestamp: i64,
    ) -> Self {
        Self {
            new_priority: new,
            ..Self::new(
                ActionType::PriorityChange,
                user_id,
                ticket_id,
                old,
                String::new(),
                timestamp,
            )
        }
    }
}

/// What an action did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Created,
    Comment,
    PriorityChange,
    StatusChange,
    Reply,
}

impl ActionType {
    pub fn as_i64(self) -> i64 {
        match self {
            ActionType::Created => 0,
            ActionType::Comment => 1,
            ActionType::PriorityChange => 2,
            ActionType::StatusChange => 3,
            ActionType::Reply => 4,
        }
    }
}

impl TryFrom<i64> for ActionType {
    type Error = anyhow::Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ActionType::Created),
            1 => Ok(ActionType::Comment),
            2 => Ok(ActionType::PriorityChange),
            3 => Ok(ActionType::StatusChange),
            4 => Ok(ActionType::Reply),
            _ => Err(anyhow::anyhow!("Invalid action type: {}", value)),
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::Created => write!(f, "created"),
            ActionType::Comment => write!(f, "comment"),
            ActionType::PriorityChange => write!(f, "priority_change"),
            ActionType::StatusChange => write!(f, "status_change"),
            ActionType::Reply => write!(f, "reply"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_action_keeps_priority() {
        let action = Action::new(ActionType::Comment, 1, 2, Priority::High, "hi".into(), 10);
        assert_eq!(action.priority, Priority::High);
        assert_eq!(action.new_priority, Priority::High);
    }

    #[test]
    fn test_priority_change_records_both_values() {
        let action = Action::priority_change(1, 2, Priority::Low, Priority::Urgent, 10);
        assert_eq!(action.action_type, ActionType::PriorityChange);
        assert_eq!(action.priority, Priority::Low);
        assert_eq!(action.new_priority, Priority::Urgent);
    }

    #[test]
    fn test_action_type_codes() {
        for code in 0..5 {
            assert_eq!(ActionType::try_from(code).unwrap().as_i64(), code);
        }
        assert!(ActionType::try_from(5).is_err());
        assert_eq!(ActionType::StatusChange.to_string(), "status_change");
    }
}
