//! Shared helpers for the HTTP tests

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

use roberts::{
    api::{build_router, AppState},
    config::{Config, Environment, I18nConfig},
    db::{create_test_pool, migrations},
    models::{CreateUserInput, User, UserType},
    services::{DynMailer, MemoryMailer, Translator},
};

pub const PASSWORD: &str = "password123";

pub struct TestApp {
    pub config: Config,
    pub state: AppState,
    pub router: Router,
    pub mailer: Arc<MemoryMailer>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(Config {
            environment: Environment::Test,
            ..Default::default()
        })
        .await
    }

    pub async fn with_config(config: Config) -> Self {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let translator = Translator::load(&I18nConfig {
            locales_path: Path::new(env!("CARGO_MANIFEST_DIR")).join("locales"),
            ..config.i18n.clone()
        })
        .expect("Failed to load locales");

        let mailer = Arc::new(MemoryMailer::new());
        let state = AppState::new(&config, pool, mailer.clone() as DynMailer, translator)
            .expect("Failed to build state");
        let router = build_router(state.clone());

        Self {
            config,
            state,
            router,
            mailer,
        }
    }

    pub async fn user(&self, name: &str, user_type: UserType) -> User {
        self.state
            .user_service
            .create_user(CreateUserInput {
                name: name.to_string(),
                password: PASSWORD.to_string(),
                user_type: Some(user_type),
            })
            .await
            .expect("Failed to create user")
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Router is infallible")
    }

    /// Log in through the form and return the `Cookie` header value to reuse
    pub async fn login(&self, name: &str) -> String {
        let response = self
            .send(
                Request::post("/login")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(format!("name={}&password={}", name, PASSWORD)))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        cookie_pair(&response).expect("Login did not set a cookie")
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut request = Request::get(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.send(request.body(Body::empty()).unwrap()).await
    }

    pub async fn json(
        &self,
        method: &str,
        uri: &str,
        cookie: &str,
        body: serde_json::Value,
    ) -> Response {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::COOKIE, cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_empty(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut request = Request::post(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.send(request.body(Body::empty()).unwrap()).await
    }
}

/// `name=value` part of the response's `Set-Cookie` header
pub fn cookie_pair(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .next()
        .map(str::to_string)
}

pub fn set_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub fn location(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}
