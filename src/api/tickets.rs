//! Ticket endpoints
//!
//! Every route needs a logged-in user; deleting a ticket needs an admin.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_page, default_per_page};
use crate::api::links::Route;
use crate::api::middleware::{ApiError, AppState, Auth, I18n};
use crate::models::{
    Action, CreateTicketInput, ListParams, PagedResult, Priority, Ticket, TicketStatus,
    UpdateTicketInput,
};
use crate::services::{TicketDetails, TicketServiceError};

/// Query parameters of GET /tickets
#[derive(Debug, Deserialize)]
pub struct ListTicketsQuery {
    pub status: Option<TicketStatus>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

#[derive(Debug, Deserialize)]
pub struct PriorityRequest {
    pub priority: Priority,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: TicketStatus,
    pub comment: Option<String>,
}

/// Body of comments and replies
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tickets", get(list_tickets).post(create_ticket))
        .route(
            "/tickets/{id}",
            get(get_ticket).put(update_ticket).delete(delete_ticket),
        )
        .route("/tickets/{id}/priority", put(change_priority))
        .route("/tickets/{id}/status", put(change_status))
        .route("/tickets/{id}/comments", post(add_comment))
        .route("/tickets/{id}/replies", post(add_reply))
        .route("/tickets/{id}/actions", get(list_actions))
}

/// GET /tickets
async fn list_tickets(
    State(state): State<AppState>,
    auth: Auth,
    i18n: I18n,
    Query(query): Query<ListTicketsQuery>,
) -> Result<Json<PagedResult<Ticket>>, ApiError> {
    auth.require_user(&i18n)?;
    let params = ListParams::new(query.page, query.per_page);
    let tickets = state
        .ticket_service
        .list(query.status, &params)
        .await
        .map_err(|e| ticket_error(&state, &i18n, e))?;
    Ok(Json(tickets))
}

/// POST /tickets
async fn create_ticket(
    State(state): State<AppState>,
    auth: Auth,
    i18n: I18n,
    Json(input): Json<CreateTicketInput>,
) -> Result<Response, ApiError> {
    let user = auth.require_user(&i18n)?;
    let ticket = state
        .ticket_service
        .create(input, user)
        .await
        .map_err(|e| ticket_error(&state, &i18n, e))?;

    let location = state.links.link_to(Route::Ticket(ticket.id));
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(ticket),
    )
        .into_response())
}

/// GET /tickets/{id}
async fn get_ticket(
    State(state): State<AppState>,
    auth: Auth,
    i18n: I18n,
    Path(id): Path<i64>,
) -> Result<Json<TicketDetails>, ApiError> {
    auth.require_user(&i18n)?;
    let details = state
        .ticket_service
        .details(id)
        .await
        .map_err(|e| ticket_error(&state, &i18n, e))?;
    Ok(Json(details))
}

/// PUT /tickets/{id}
async fn update_ticket(
    State(state): State<AppState>,
    auth: Auth,
    i18n: I18n,
    Path(id): Path<i64>,
    Json(input): Json<UpdateTicketInput>,
) -> Result<Json<Ticket>, ApiError> {
    let user = auth.require_user(&i18n)?;
    let ticket = state
        .ticket_service
        .update(id, input, user)
        .await
        .map_err(|e| ticket_error(&state, &i18n, e))?;
    Ok(Json(ticket))
}

/// DELETE /tickets/{id}
async fn delete_ticket(
    State(state): State<AppState>,
    auth: Auth,
    i18n: I18n,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    auth.require_admin(&i18n)?;
    state
        .ticket_service
        .delete(id)
        .await
        .map_err(|e| ticket_error(&state, &i18n, e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /tickets/{id}/priority
async fn change_priority(
    State(state): State<AppState>,
    auth: Auth,
    i18n: I18n,
    Path(id): Path<i64>,
    Json(body): Json<PriorityRequest>,
) -> Result<Json<Ticket>, ApiError> {
    let user = auth.require_user(&i18n)?;
    let ticket = state
        .ticket_service
        .change_priority(id, body.priority, user)
        .await
        .map_err(|e| ticket_error(&state, &i18n, e))?;
    Ok(Json(ticket))
}

/// PUT /tickets/{id}/status
async fn change_status(
    State(state): State<AppState>,
    auth: Auth,
    i18n: I18n,
    Path(id): Path<i64>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<Ticket>, ApiError> {
    let user = auth.require_user(&i18n)?;
    let comment = body.comment.filter(|c| !c.trim().is_empty());
    let ticket = state
        .ticket_service
        .change_status(id, body.status, comment, user)
        .await
        .map_err(|e| ticket_error(&state, &i18n, e))?;
    Ok(Json(ticket))
}

/// POST /tickets/{id}/comments
async fn add_comment(
    State(state): State<AppState>,
    auth: Auth,
    i18n: I18n,
    Path(id): Path<i64>,
    Json(body): Json<MessageRequest>,
) -> Result<(StatusCode, Json<Action>), ApiError> {
    let user = auth.require_user(&i18n)?;
    let action = state
        .ticket_service
        .comment(id, &body.text, user)
        .await
        .map_err(|e| ticket_error(&state, &i18n, e))?;
    Ok((StatusCode::CREATED, Json(action)))
}

/// POST /tickets/{id}/replies
///
/// The mail subject is written in the requester's language.
async fn add_reply(
    State(state): State<AppState>,
    auth: Auth,
    i18n: I18n,
    Path(id): Path<i64>,
    Json(body): Json<MessageRequest>,
) -> Result<(StatusCode, Json<Action>), ApiError> {
    let user = auth.require_user(&i18n)?;
    let action = state
        .ticket_service
        .reply(id, &body.text, user, &i18n.locale)
        .await
        .map_err(|e| ticket_error(&state, &i18n, e))?;
    Ok((StatusCode::CREATED, Json(action)))
}

/// GET /tickets/{id}/actions
async fn list_actions(
    State(state): State<AppState>,
    auth: Auth,
    i18n: I18n,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Action>>, ApiError> {
    auth.require_user(&i18n)?;
    state
        .ticket_service
        .get(id)
        .await
        .map_err(|e| ticket_error(&state, &i18n, e))?;
    let actions = state
        .ticket_service
        .actions(id)
        .await
        .map_err(|e| ticket_error(&state, &i18n, e))?;
    Ok(Json(actions))
}

fn ticket_error(state: &AppState, i18n: &I18n, error: TicketServiceError) -> ApiError {
    match error {
        TicketServiceError::NotFound(_) => ApiError::not_found(i18n.t("tickets.not_found")),
        TicketServiceError::EmptyTitle => {
            ApiError::validation_error(i18n.t("tickets.title_required"))
        }
        TicketServiceError::InvalidEmail(email) => {
            ApiError::validation_error(i18n.t_with("tickets.invalid_email", &[("email", &email)]))
        }
        TicketServiceError::EmptyComment => {
            ApiError::validation_error(i18n.t("tickets.comment_required"))
        }
        TicketServiceError::MailDelivery(e) => {
            tracing::error!("Reply delivery failed: {:#}", e);
            if state.environment.handle_exceptions() {
                ApiError::bad_gateway(i18n.t("errors.internal"))
            } else {
                ApiError::bad_gateway(format!("{:#}", e))
            }
        }
        TicketServiceError::InternalError(e) => state.internal_error(i18n, e),
    }
}
