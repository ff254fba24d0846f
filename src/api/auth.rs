//! Authentication endpoints
//!
//! - GET / - Home, tells whether the request is authenticated
//! - POST /login - Form login
//! - POST /logout - Logout
//! - GET /me - Current user

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::links::Route;
use crate::api::middleware::{ApiError, AppState, Auth, I18n};
use crate::models::User;
use crate::services::user::AuthError;

/// Form fields of POST /login
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub name: String,
    pub password: String,
}

/// Body of GET /
#[derive(Debug, Serialize)]
pub struct HomeResponse {
    pub authenticated: bool,
    pub current_user: Option<User>,
    pub message: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

/// GET /
async fn home(auth: Auth, i18n: I18n) -> Json<HomeResponse> {
    let message = match auth.current_user() {
        Some(user) => i18n.t_with("home.welcome_user", &[("name", &user.name)]),
        None => i18n.t("home.welcome"),
    };

    Json(HomeResponse {
        authenticated: auth.authenticated(),
        current_user: auth.current_user().cloned(),
        message,
    })
}

/// POST /login
///
/// A login while authenticated replaces the current session.
async fn login(
    State(state): State<AppState>,
    auth: Auth,
    i18n: I18n,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    let user = match state.user_service.login(&form.name, &form.password).await {
        Ok(user) => user,
        Err(AuthError::InvalidCredentials) => {
            return Err(ApiError::unauthorized(i18n.t("auth.invalid_credentials")))
        }
        Err(AuthError::InternalError(e)) => return Err(state.internal_error(&i18n, e)),
    };

    if let Some(previous) = auth.current_session() {
        state
            .sessions
            .delete(previous)
            .await
            .map_err(|e| state.internal_error(&i18n, e))?;
    }

    let session = state
        .sessions
        .create(&user)
        .await
        .map_err(|e| state.internal_error(&i18n, e))?;

    let cookie = state.sessions.session_cookie(&session);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Redirect::to(&state.links.link_to(Route::Home)),
    )
        .into_response())
}

/// POST /logout
///
/// Authenticated: the session is deleted and the cookie cleared.
/// Anonymous: nothing changes. Both redirect home.
async fn logout(
    State(state): State<AppState>,
    auth: Auth,
    i18n: I18n,
) -> Result<Response, ApiError> {
    let home = Redirect::to(&state.links.link_to(Route::Home));

    let Some(session) = auth.current_session() else {
        return Ok(home.into_response());
    };

    state
        .sessions
        .delete(session)
        .await
        .map_err(|e| state.internal_error(&i18n, e))?;
    tracing::info!("User {} logged out", session.user_id);

    Ok(([(header::SET_COOKIE, state.sessions.clear_cookie())], home).into_response())
}

/// GET /me
async fn me(auth: Auth, i18n: I18n) -> Result<Json<User>, ApiError> {
    let user = auth.require_user(&i18n)?;
    Ok(Json(user.clone()))
}
