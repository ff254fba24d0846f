//! Ticket model
//!
//! A ticket is a request filed with the help desk. Its type, priority and
//! status are small integer codes in the database and lowercase names in
//! JSON.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A help desk ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub ticket_type: TicketType,
    pub priority: Priority,
    /// Creation time as unix seconds
    pub created_at: i64,
    /// User who filed the ticket
    pub reported_by: i64,
    /// Address replies are mailed to
    pub email_to_reply: String,
    pub status: TicketStatus,
}

impl Ticket {
    /// Create a new open ticket reported by `reported_by` at `created_at`.
    pub fn new(input: CreateTicketInput, reported_by: i64, created_at: i64) -> Self {
        Self {
            id: 0, // Will be set by the database
            title: input.title,
            description: input.description,
            ticket_type: input.ticket_type,
            priority: input.priority,
            created_at,
            reported_by,
            email_to_reply: input.email_to_reply,
            status: TicketStatus::Open,
        }
    }
}

/// Kind of request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketType {
    #[default]
    Question,
    Incident,
    Problem,
    Task,
}

impl TicketType {
    pub fn as_i64(self) -> i64 {
        match self {
            TicketType::Question => 0,
            TicketType::Incident => 1,
            TicketType::Problem => 2,
            TicketType::Task => 3,
        }
    }
}

impl TryFrom<i64> for TicketType {
    type Error = anyhow::Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TicketType::Question),
            1 => Ok(TicketType::Incident),
            2 => Ok(TicketType::Problem),
            3 => Ok(TicketType::Task),
            _ => Err(anyhow::anyhow!("Invalid ticket type: {}", value)),
        }
    }
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketType::Question => write!(f, "question"),
            TicketType::Incident => write!(f, "incident"),
            TicketType::Problem => write!(f, "problem"),
            TicketType::Task => write!(f, "task"),
        }
    }
}

/// Ticket priority, ordered from least to most pressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_i64(self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Urgent => 3,
        }
    }
}

impl TryFrom<i64> for Priority {
    type Error = anyhow::Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Priority::Low),
            1 => Ok(Priority::Normal),
            2 => Ok(Priority::High),
            3 => Ok(Priority::Urgent),
            _ => Err(anyhow::anyhow!("Invalid priority: {}", value)),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Urgent => write!(f, "urgent"),
        }
    }
}

/// Where a ticket is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            TicketStatus::Open => 0,
            TicketStatus::InProgress => 1,
            TicketStatus::Resolved => 2,
            TicketStatus::Closed => 3,
        }
    }
}

impl TryFrom<i64> for TicketStatus {
    type Error = anyhow::Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TicketStatus::Open),
            1 => Ok(TicketStatus::InProgress),
            2 => Ok(TicketStatus::Resolved),
            3 => Ok(TicketStatus::Closed),
            _ => Err(anyhow::anyhow!("Invalid ticket status: {}", value)),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketStatus::Open => write!(f, "open"),
            TicketStatus::InProgress => write!(f, "in_progress"),
            TicketStatus::Resolved => write!(f, "resolved"),
            TicketStatus::Closed => write!(f, "closed"),
        }
    }
}

impl FromStr for TicketStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(TicketStatus::Open),
            "in_progress" => Ok(TicketStatus::InProgress),
            "resolved" => Ok(TicketStatus::Resolved),
            "closed" => Ok(TicketStatus::Closed),
            _ => Err(anyhow::anyhow!("Invalid ticket status: {}", s)),
        }
    }
}

/// Input for filing a ticket
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTicketInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub ticket_type: TicketType,
    #[serde(default)]
    pub priority: Priority,
    pub email_to_reply: String,
}

/// Input for editing a ticket. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTicketInput {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub ticket_type: Option<TicketType>,
    pub email_to_reply: Option<String>,
}
