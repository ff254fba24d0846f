//! User management endpoints (admin only)
//!
//! - GET /users - List users
//! - POST /users - Create a user
//! - DELETE /users/{id} - Delete a user and their sessions

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, Auth, I18n};
use crate::models::{CreateUserInput, User};
use crate::services::user::UserServiceError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", delete(delete_user))
}

/// GET /users
async fn list_users(
    State(state): State<AppState>,
    auth: Auth,
    i18n: I18n,
) -> Result<Json<Vec<User>>, ApiError> {
    auth.require_admin(&i18n)?;
    let users = state
        .user_service
        .list()
        .await
        .map_err(|e| user_error(&state, &i18n, e))?;
    Ok(Json(users))
}

/// POST /users
async fn create_user(
    State(state): State<AppState>,
    auth: Auth,
    i18n: I18n,
    Json(input): Json<CreateUserInput>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    auth.require_admin(&i18n)?;
    let user = state
        .user_service
        .create_user(input)
        .await
        .map_err(|e| user_error(&state, &i18n, e))?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// DELETE /users/{id}
async fn delete_user(
    State(state): State<AppState>,
    auth: Auth,
    i18n: I18n,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let admin = auth.require_admin(&i18n)?;
    state
        .user_service
        .delete(id, admin.id)
        .await
        .map_err(|e| user_error(&state, &i18n, e))?;

    // Normally gone through the foreign key already
    let leftover = state
        .sessions
        .delete_for_user(id)
        .await
        .map_err(|e| state.internal_error(&i18n, e))?;
    if leftover > 0 {
        tracing::debug!("Removed {} leftover session(s) of user {}", leftover, id);
    }

    Ok(StatusCode::NO_CONTENT)
}

fn user_error(state: &AppState, i18n: &I18n, error: UserServiceError) -> ApiError {
    match error {
        UserServiceError::EmptyName => ApiError::validation_error(i18n.t("users.name_required")),
        UserServiceError::PasswordTooShort(min) => ApiError::validation_error(
            i18n.t_with("users.password_too_short", &[("min", &min.to_string())]),
        ),
        UserServiceError::UserExists(name) => {
            ApiError::conflict(i18n.t_with("users.name_taken", &[("name", &name)]))
        }
        UserServiceError::NotFound(_) => ApiError::not_found(i18n.t("users.not_found")),
        UserServiceError::CannotDeleteSelf => {
            ApiError::validation_error(i18n.t("users.cannot_delete_self"))
        }
        UserServiceError::HasHistory(name) => {
            ApiError::conflict(i18n.t_with("users.has_history", &[("name", &name)]))
        }
        UserServiceError::InternalError(e) => state.internal_error(i18n, e),
    }
}
