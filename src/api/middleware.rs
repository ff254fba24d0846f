//! API middleware
//!
//! Contains:
//! - Application state shared by all handlers
//! - The JSON error type
//! - Session authentication (never rejects; handlers decide)
//! - Request extractors for authentication and translation
//! - Protection layers: frame options, HTTP origin check, path traversal

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;

use crate::api::links::Links;
use crate::config::{Config, Environment};
use crate::db::repositories::{
    SqlxActionRepository, SqlxSessionRepository, SqlxTicketRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{Session, User};
use crate::services::{DynMailer, SessionManager, TicketService, Translator, UserService};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub environment: Environment,
    /// Origin accepted for state-changing requests besides the request's own host
    pub allowed_origin: Option<String>,
    pub sessions: Arc<SessionManager>,
    pub user_service: Arc<UserService>,
    pub ticket_service: Arc<TicketService>,
    pub translator: Arc<Translator>,
    pub links: Links,
}

impl AppState {
    /// Wire repositories and services together.
    pub fn new(
        config: &Config,
        pool: DynDatabasePool,
        mailer: DynMailer,
        translator: Translator,
    ) -> anyhow::Result<Self> {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let translator = Arc::new(translator);

        let sessions = SessionManager::new(
            SqlxSessionRepository::boxed(pool.clone()),
            user_repo.clone(),
            &config.session,
            config.session_secret(),
        )?;
        let ticket_service = TicketService::new(
            SqlxTicketRepository::boxed(pool.clone()),
            SqlxActionRepository::boxed(pool.clone()),
            mailer,
            translator.clone(),
        );

        Ok(Self {
            pool,
            environment: config.environment,
            allowed_origin: config.server.allowed_origin.clone(),
            sessions: Arc::new(sessions),
            user_service: Arc::new(UserService::new(user_repo)),
            ticket_service: Arc::new(ticket_service),
            translator,
            links: Links::new(&config.server.mount_path),
        })
    }

    /// Turn an unexpected failure into a 500.
    ///
    /// The error is always logged. Its details reach the client only when
    /// the environment does not handle exceptions (development, test).
    pub fn internal_error(&self, i18n: &I18n, error: impl Display) -> ApiError {
        tracing::error!("Internal error: {:#}", error);
        if self.environment.handle_exceptions() {
            ApiError::internal_error(i18n.t("errors.internal"))
        } else {
            ApiError::internal_error(format!("{:#}", error))
        }
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new("BAD_GATEWAY", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "BAD_GATEWAY" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Who is making the request. Inserted into every request by [`authenticate`].
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub current_user: Option<User>,
    pub current_session: Option<Session>,
}

impl AuthContext {
    pub fn authenticated(&self) -> bool {
        self.current_user.is_some()
    }
}

/// Resolve the session cookie into an [`AuthContext`].
///
/// Missing, tampered, unknown or expired sessions all yield an anonymous
/// context. Lookup failures are logged and treated the same way.
pub async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let mut context = AuthContext::default();

    if let Some(value) = state.sessions.cookie_from_headers(request.headers()) {
        match state.sessions.authenticate_cookie(value).await {
            Ok(Some((session, user))) => {
                context.current_session = Some(session);
                context.current_user = Some(user);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Session lookup failed: {:#}", e),
        }
    }

    request.extensions_mut().insert(context);
    next.run(request).await
}

/// Authentication extractor
///
/// Never rejects: without the [`authenticate`] layer the request is anonymous.
#[derive(Debug, Clone, Default)]
pub struct Auth(pub AuthContext);

impl Auth {
    pub fn current_user(&self) -> Option<&User> {
        self.0.current_user.as_ref()
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.0.current_session.as_ref()
    }

    pub fn authenticated(&self) -> bool {
        self.0.authenticated()
    }

    /// The current user, or 401
    pub fn require_user(&self, i18n: &I18n) -> Result<&User, ApiError> {
        self.current_user()
            .ok_or_else(|| ApiError::unauthorized(i18n.t("auth.login_required")))
    }

    /// The current user if they are an admin; 401 or 403 otherwise
    pub fn require_admin(&self, i18n: &I18n) -> Result<&User, ApiError> {
        let user = self.require_user(i18n)?;
        if !user.is_admin() {
            return Err(ApiError::forbidden(i18n.t("auth.admin_required")));
        }
        Ok(user)
    }
}

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Auth(
            parts
                .extensions
                .get::<AuthContext>()
                .cloned()
                .unwrap_or_default(),
        ))
    }
}

// ============================================================================
// Translation
// ============================================================================

/// Translator bound to the locale negotiated from `Accept-Language`
#[derive(Debug, Clone)]
pub struct I18n {
    translator: Arc<Translator>,
    pub locale: String,
}

impl I18n {
    pub fn new(translator: Arc<Translator>, accept_language: Option<&str>) -> Self {
        let locale = translator.negotiate(accept_language);
        Self { translator, locale }
    }

    pub fn t(&self, key: &str) -> String {
        self.translator.t(&self.locale, key)
    }

    pub fn t_with(&self, key: &str, args: &[(&str, &str)]) -> String {
        self.translator.translate(&self.locale, key, args)
    }
}

impl FromRequestParts<AppState> for I18n {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let accept_language = parts
            .headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok());
        Ok(I18n::new(state.translator.clone(), accept_language))
    }
}

// ============================================================================
// Protection
// ============================================================================

/// Forbid framing by other sites
pub async fn frame_options(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .entry(header::X_FRAME_OPTIONS)
        .or_insert(HeaderValue::from_static("SAMEORIGIN"));
    response
}

/// Reject state-changing requests sent from a foreign origin.
///
/// Requests without an `Origin` header pass. Otherwise the origin must match
/// the request's own host or the configured allowed origin.
pub async fn http_origin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if is_safe_method(request.method()) {
        return next.run(request).await;
    }

    let headers = request.headers();
    let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) else {
        return next.run(request).await;
    };
    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());

    if origin_allowed(origin, host, state.allowed_origin.as_deref()) {
        return next.run(request).await;
    }

    tracing::warn!("Rejected {} {} from origin {}", request.method(), request.uri().path(), origin);
    let i18n = I18n::new(
        state.translator.clone(),
        headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok()),
    );
    ApiError::forbidden(i18n.t("errors.forbidden_origin")).into_response()
}

fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

fn origin_allowed(origin: &str, host: Option<&str>, allowed: Option<&str>) -> bool {
    let origin = origin.trim_end_matches('/');
    if allowed.is_some_and(|allowed| allowed.trim_end_matches('/').eq_ignore_ascii_case(origin)) {
        return true;
    }
    let origin_host = origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"));
    matches!((origin_host, host), (Some(o), Some(h)) if o.eq_ignore_ascii_case(h))
}

/// Reject paths containing `..` segments, plain or percent-encoded
pub async fn path_traversal(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if has_parent_segment(request.uri().path()) {
        tracing::warn!("Rejected path traversal attempt: {}", request.uri().path());
        let i18n = I18n::new(
            state.translator.clone(),
            request
                .headers()
                .get(header::ACCEPT_LANGUAGE)
                .and_then(|v| v.to_str().ok()),
        );
        return ApiError::validation_error(i18n.t("errors.bad_path")).into_response();
    }
    next.run(request).await
}

fn has_parent_segment(path: &str) -> bool {
    let decoded = path
        .to_ascii_lowercase()
        .replace("%2e", ".")
        .replace("%2f", "/")
        .replace("%5c", "\\");
    decoded.split(['/', '\\']).any(|segment| segment == "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status_codes() {
        let cases = [
            (ApiError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (ApiError::forbidden("x"), StatusCode::FORBIDDEN),
            (ApiError::not_found("x"), StatusCode::NOT_FOUND),
            (ApiError::validation_error("x"), StatusCode::BAD_REQUEST),
            (ApiError::conflict("x"), StatusCode::CONFLICT),
            (ApiError::bad_gateway("x"), StatusCode::BAD_GATEWAY),
            (ApiError::internal_error("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_auth_context_default_is_anonymous() {
        let auth = Auth::default();
        assert!(!auth.authenticated());
        assert!(auth.current_session().is_none());
    }

    #[test]
    fn test_require_user_and_admin() {
        use crate::models::UserType;
        let i18n = I18n::new(Arc::new(Translator::builtin()), None);

        let err = Auth::default().require_user(&i18n).unwrap_err();
        assert_eq!(err.error.code, "UNAUTHORIZED");
        assert_eq!(err.error.message, "You must be logged in");

        let mut agent = User::new("ana".into(), "h".into(), UserType::Agent);
        agent.id = 1;
        let auth = Auth(AuthContext {
            current_user: Some(agent),
            current_session: None,
        });
        assert!(auth.require_user(&i18n).is_ok());
        assert_eq!(auth.require_admin(&i18n).unwrap_err().error.code, "FORBIDDEN");
    }

    #[test]
    fn test_origin_allowed() {
        assert!(origin_allowed("http://desk.local", Some("desk.local"), None));
        assert!(origin_allowed("https://desk.local:2300", Some("desk.local:2300"), None));
        assert!(!origin_allowed("https://evil.example", Some("desk.local"), None));
        assert!(origin_allowed(
            "https://app.example",
            Some("desk.local"),
            Some("https://app.example/")
        ));
        assert!(!origin_allowed("null", Some("desk.local"), None));
    }

    #[test]
    fn test_parent_segments() {
        assert!(has_parent_segment("/tickets/../users"));
        assert!(has_parent_segment("/tickets/%2e%2e/users"));
        assert!(has_parent_segment("/tickets/%2E./users"));
        assert!(has_parent_segment("/static/..%2fsecret"));
        assert!(!has_parent_segment("/tickets/1"));
        assert!(!has_parent_segment("/files/a..b"));
    }

    #[test]
    fn test_safe_methods() {
        assert!(is_safe_method(&Method::GET));
        assert!(!is_safe_method(&Method::POST));
        assert!(!is_safe_method(&Method::DELETE));
    }
}
