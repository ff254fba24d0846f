//! Ticket service
//!
//! The ticket workflow. Every change to a ticket is written to its action
//! log; replies are additionally mailed to the ticket's reply address.

use crate::db::repositories::{ActionRepository, TicketRepository};
use crate::models::{
    Action, ActionType, CreateTicketInput, ListParams, PagedResult, Priority, Ticket,
    TicketStatus, UpdateTicketInput, User,
};
use crate::services::i18n::Translator;
use crate::services::mail::{DynMailer, OutgoingMail};
use crate::services::session::now;
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

/// Error types for ticket operations
#[derive(Debug, thiserror::Error)]
pub enum TicketServiceError {
    #[error("Ticket not found: {0}")]
    NotFound(i64),

    #[error("Title cannot be empty")]
    EmptyTitle,

    #[error("Invalid reply address: {0}")]
    InvalidEmail(String),

    #[error("Comment cannot be empty")]
    EmptyComment,

    /// The reply could not be delivered; nothing was recorded
    #[error("Mail delivery failed: {0}")]
    MailDelivery(anyhow::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A ticket together with its action log
#[derive(Debug, Clone, Serialize)]
pub struct TicketDetails {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub actions: Vec<Action>,
}

/// Ticket service
pub struct TicketService {
    tickets: Arc<dyn TicketRepository>,
    actions: Arc<dyn ActionRepository>,
    mailer: DynMailer,
    translator: Arc<Translator>,
}

impl TicketService {
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        actions: Arc<dyn ActionRepository>,
        mailer: DynMailer,
        translator: Arc<Translator>,
    ) -> Self {
        Self {
            tickets,
            actions,
            mailer,
            translator,
        }
    }

    /// File a ticket on behalf of `reporter`.
    pub async fn create(
        &self,
        mut input: CreateTicketInput,
        reporter: &User,
    ) -> Result<Ticket, TicketServiceError> {
        input.title = validate_title(&input.title)?;
        input.email_to_reply = validate_email(&input.email_to_reply)?;

        let ticket = self
            .tickets
            .create(&Ticket::new(input, reporter.id, now()))
            .await
            .context("Failed to create ticket")?;

        self.record(Action::new(
            ActionType::Created,
            reporter.id,
            ticket.id,
            ticket.priority,
            String::new(),
            ticket.created_at,
        ))
        .await?;

        tracing::info!("Ticket #{} filed by {}", ticket.id, reporter.name);
        Ok(ticket)
    }

    pub async fn get(&self, id: i64) -> Result<Ticket, TicketServiceError> {
        self.tickets
            .get_by_id(id)
            .await
            .context("Failed to get ticket")?
            .ok_or(TicketServiceError::NotFound(id))
    }

    /// The ticket and its full action log
    pub async fn details(&self, id: i64) -> Result<TicketDetails, TicketServiceError> {
        let ticket = self.get(id).await?;
        let actions = self.actions(id).await?;
        Ok(TicketDetails { ticket, actions })
    }

    /// Newest first, optionally only those with `status`
    pub async fn list(
        &self,
        status: Option<TicketStatus>,
        params: &ListParams,
    ) -> Result<PagedResult<Ticket>, TicketServiceError> {
        let (tickets, total) = self
            .tickets
            .list(status, params)
            .await
            .context("Failed to list tickets")?;
        Ok(PagedResult::new(tickets, total, params))
    }

    /// Action log of a ticket, oldest first
    pub async fn actions(&self, id: i64) -> Result<Vec<Action>, TicketServiceError> {
        Ok(self
            .actions
            .list_by_ticket(id)
            .await
            .context("Failed to list actions")?)
    }

    /// Edit title, description, type or reply address.
    ///
    /// Recorded as a comment naming the edited fields. An edit that changes
    /// nothing records nothing.
    pub async fn update(
        &self,
        id: i64,
        input: UpdateTicketInput,
        user: &User,
    ) -> Result<Ticket, TicketServiceError> {
        let mut ticket = self.get(id).await?;
        let mut changed = Vec::new();

        if let Some(title) = input.title {
            let title = validate_title(&title)?;
            if title != ticket.title {
                ticket.title = title;
                changed.push("title");
            }
        }
        if let Some(description) = input.description {
            if description != ticket.description {
                ticket.description = description;
                changed.push("description");
            }
        }
        if let Some(ticket_type) = input.ticket_type {
            if ticket_type != ticket.ticket_type {
                ticket.ticket_type = ticket_type;
                changed.push("type");
            }
        }
        if let Some(email) = input.email_to_reply {
            let email = validate_email(&email)?;
            if email != ticket.email_to_reply {
                ticket.email_to_reply = email;
                changed.push("email_to_reply");
            }
        }

        if changed.is_empty() {
            return Ok(ticket);
        }

        let ticket = self
            .tickets
            .update(&ticket)
            .await
            .context("Failed to update ticket")?;
        self.record(Action::new(
            ActionType::Comment,
            user.id,
            ticket.id,
            ticket.priority,
            format!("Edited {}", changed.join(", ")),
            now(),
        ))
        .await?;

        Ok(ticket)
    }

    /// Change the priority, recording old and new values.
    pub async fn change_priority(
        &self,
        id: i64,
        priority: Priority,
        user: &User,
    ) -> Result<Ticket, TicketServiceError> {
        let mut ticket = self.get(id).await?;
        if ticket.priority == priority {
            return Ok(ticket);
        }

        let old = ticket.priority;
        ticket.priority = priority;
        let ticket = self
            .tickets
            .update(&ticket)
            .await
            .context("Failed to update ticket priority")?;
        self.record(Action::priority_change(user.id, ticket.id, old, priority, now()))
            .await?;

        tracing::info!("Ticket #{} priority {} -> {}", ticket.id, old, priority);
        Ok(ticket)
    }

    /// Move the ticket to `status`. The optional comment is kept on the action.
    pub async fn change_status(
        &self,
        id: i64,
        status: TicketStatus,
        comment: Option<String>,
        user: &User,
    ) -> Result<Ticket, TicketServiceError> {
        let mut ticket = self.get(id).await?;
        if ticket.status == status {
            return Ok(ticket);
        }

        let old = ticket.status;
        ticket.status = status;
        let ticket = self
            .tickets
            .update(&ticket)
            .await
            .context("Failed to update ticket status")?;
        self.record(Action::new(
            ActionType::StatusChange,
            user.id,
            ticket.id,
            ticket.priority,
            comment.unwrap_or_else(|| format!("{} -> {}", old, status)),
            now(),
        ))
        .await?;

        tracing::info!("Ticket #{} status {} -> {}", ticket.id, old, status);
        Ok(ticket)
    }

    /// Add an internal comment
    pub async fn comment(
        &self,
        id: i64,
        text: &str,
        user: &User,
    ) -> Result<Action, TicketServiceError> {
        let text = validate_comment(text)?;
        let ticket = self.get(id).await?;
        self.record(Action::new(
            ActionType::Comment,
            user.id,
            ticket.id,
            ticket.priority,
            text,
            now(),
        ))
        .await
    }

    /// Mail a reply to the ticket's reply address and record it.
    ///
    /// The subject is translated into `locale`.
    pub async fn reply(
        &self,
        id: i64,
        text: &str,
        user: &User,
        locale: &str,
    ) -> Result<Action, TicketServiceError> {
        let text = validate_comment(text)?;
        let ticket = self.get(id).await?;

        let ticket_id = ticket.id.to_string();
        let mail = OutgoingMail {
            to: ticket.email_to_reply.clone(),
            subject: self.translator.translate(
                locale,
                "tickets.reply_subject",
                &[("id", &ticket_id), ("title", &ticket.title)],
            ),
            body: text.clone(),
        };
        self.mailer
            .send(&mail)
            .await
            .map_err(TicketServiceError::MailDelivery)?;

        self.record(Action::new(
            ActionType::Reply,
            user.id,
            ticket.id,
            ticket.priority,
            text,
            now(),
        ))
        .await
    }

    /// Delete a ticket and its action log
    pub async fn delete(&self, id: i64) -> Result<(), TicketServiceError> {
        let ticket = self.get(id).await?;
        self.actions
            .delete_by_ticket(ticket.id)
            .await
            .context("Failed to delete ticket actions")?;
        self.tickets
            .delete(ticket.id)
            .await
            .context("Failed to delete ticket")?;
        tracing::info!("Deleted ticket #{}", ticket.id);
        Ok(())
    }

    async fn record(&self, action: Action) -> Result<Action, TicketServiceError> {
        Ok(self
            .actions
            .create(&action)
            .await
            .context("Failed to record ticket action")?)
    }
}

fn validate_title(title: &str) -> Result<String, TicketServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(TicketServiceError::EmptyTitle);
    }
    Ok(title.to_string())
}

fn validate_email(email: &str) -> Result<String, TicketServiceError> {
    let email = email.trim();
    email
        .parse::<lettre::Address>()
        .map(|_| email.to_string())
        .map_err(|_| TicketServiceError::InvalidEmail(email.to_string()))
}

fn validate_comment(text: &str) -> Result<String, TicketServiceError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(TicketServiceError::EmptyComment);
    }
    Ok(text.to_string())
}
