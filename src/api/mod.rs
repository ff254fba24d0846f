//! API layer - HTTP handlers and routing
//!
//! - Auth endpoints (home, login, logout, me)
//! - User management endpoints
//! - Ticket endpoints
//! - Middleware: session authentication and request protection

pub mod auth;
pub mod common;
pub mod links;
pub mod middleware;
pub mod tickets;
pub mod users;

use axum::{middleware as axum_middleware, response::IntoResponse, Router};
use tower_http::trace::TraceLayer;

pub use links::{Links, Route};
pub use middleware::{ApiError, AppState, Auth, AuthContext, I18n};

/// Routes relative to the application root
fn app_routes() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(tickets::router())
}

/// Build the complete router with middleware
///
/// Routes are nested under the links prefix when one is configured.
pub fn build_router(state: AppState) -> Router {
    let prefix = state.links.prefix().to_string();
    let routes = if prefix.is_empty() {
        app_routes()
    } else {
        Router::new().nest(&prefix, app_routes())
    };

    routes
        .fallback(not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::path_traversal,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::http_origin,
        ))
        .layer(axum_middleware::from_fn(middleware::frame_options))
        // Request spans (outermost layer, runs for all requests)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found(i18n: I18n) -> impl IntoResponse {
    ApiError::not_found(i18n.t("errors.not_found"))
}
