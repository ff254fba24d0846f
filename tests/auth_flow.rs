//! Login, logout and session resolution over HTTP

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::{body_json, cookie_pair, location, set_cookie, TestApp, PASSWORD};

use roberts::{
    config::{Config, Environment, ServerConfig},
    db::{
        repositories::{SessionRepository, SqlxSessionRepository},
        DatabasePool,
    },
    models::{Session, UserType},
    services::{hash_password, session::now, CookieSigner},
};

/// Token part of a `session_token=<token>--<sig>` pair
fn token_of(cookie: &str) -> String {
    let value = cookie.split_once('=').unwrap().1;
    value.rsplit_once("--").unwrap().0.to_string()
}

#[tokio::test]
async fn anonymous_home_is_not_authenticated() {
    let app = TestApp::new().await;

    let response = app.get("/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::X_FRAME_OPTIONS).unwrap(),
        "SAMEORIGIN"
    );

    let body = body_json(response).await;
    assert_eq!(body["authenticated"], false);
    assert!(body["current_user"].is_null());
    assert_eq!(body["message"], "Welcome to the help desk");
}

#[tokio::test]
async fn login_sets_signed_cookie_and_authenticates() {
    let app = TestApp::new().await;
    let ana = app.user("ana", UserType::Agent).await;

    let response = app
        .send(
            Request::post("/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(format!("name=ana&password={}", PASSWORD)))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response).as_deref(), Some("/"));

    let header = set_cookie(&response).unwrap();
    assert!(header.starts_with("session_token="));
    assert!(header.contains("HttpOnly"));
    assert!(header.contains("SameSite=Lax"));
    assert!(header.contains("Path=/"));

    let cookie = cookie_pair(&response).unwrap();
    let token = token_of(&cookie);
    assert_eq!(token.len(), 64);

    let body = body_json(app.get("/", Some(&cookie)).await).await;
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["current_user"]["id"], ana.id);
    assert_eq!(body["current_user"]["name"], "ana");
    assert!(body["current_user"].get("password").is_none());
    assert_eq!(body["message"], "Welcome back, ana");

    let me = body_json(app.get("/me", Some(&cookie)).await).await;
    assert_eq!(me["type"], "agent");
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let app = TestApp::new().await;
    app.user("ana", UserType::Agent).await;

    let response = app
        .send(
            Request::post("/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("name=ana&password=nope"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie(&response).is_none());

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert_eq!(body["error"]["message"], "Invalid name or password");
}

#[tokio::test]
async fn me_requires_login() {
    let app = TestApp::new().await;
    let response = app.get("/me", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_deletes_session_and_clears_cookie() {
    let app = TestApp::new().await;
    app.user("ana", UserType::Agent).await;
    let cookie = app.login("ana").await;
    let token = token_of(&cookie);

    let response = app.post_empty("/logout", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response).as_deref(), Some("/"));
    let cleared = set_cookie(&response).unwrap();
    assert!(cleared.starts_with("session_token=;"));
    assert!(cleared.contains("Max-Age=0"));

    assert!(app.state.sessions.find_by_token(&token).await.unwrap().is_none());

    let body = body_json(app.get("/", Some(&cookie)).await).await;
    assert_eq!(body["authenticated"], false);
}

#[tokio::test]
async fn anonymous_logout_changes_nothing() {
    let app = TestApp::new().await;
    app.user("ana", UserType::Agent).await;
    let cookie = app.login("ana").await;
    let token = token_of(&cookie);

    let response = app.post_empty("/logout", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response).as_deref(), Some("/"));
    assert!(set_cookie(&response).is_none());

    assert!(app.state.sessions.find_by_token(&token).await.unwrap().is_some());
}

#[tokio::test]
async fn logout_twice_gives_same_redirect() {
    let app = TestApp::new().await;
    app.user("ana", UserType::Agent).await;
    let cookie = app.login("ana").await;

    let first = app.post_empty("/logout", Some(&cookie)).await;
    let second = app.post_empty("/logout", Some(&cookie)).await;

    assert_eq!(first.status(), StatusCode::SEE_OTHER);
    assert_eq!(second.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&first), location(&second));
}

#[tokio::test]
async fn tampered_cookie_is_anonymous() {
    let app = TestApp::new().await;
    app.user("ana", UserType::Agent).await;
    let cookie = app.login("ana").await;

    let token = token_of(&cookie);
    let forged = format!("session_token={}--AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA", token);
    let body = body_json(app.get("/", Some(&forged)).await).await;
    assert_eq!(body["authenticated"], false);

    let unsigned = format!("session_token={}", token);
    let body = body_json(app.get("/", Some(&unsigned)).await).await;
    assert_eq!(body["authenticated"], false);
}

#[tokio::test]
async fn expired_session_is_anonymous_and_removed() {
    let app = TestApp::new().await;
    let ana = app.user("ana", UserType::Agent).await;

    let sessions = SqlxSessionRepository::new(app.state.pool.clone());
    sessions
        .create(&Session {
            id: 0,
            user_id: ana.id,
            expiration: now() - 10,
            token: "expired-token".to_string(),
        })
        .await
        .unwrap();

    let signer = CookieSigner::new(app.config.session_secret()).unwrap();
    let cookie = format!("session_token={}", signer.sign("expired-token"));

    let body = body_json(app.get("/", Some(&cookie)).await).await;
    assert_eq!(body["authenticated"], false);
    assert!(sessions.find_by_token("expired-token").await.unwrap().is_none());
}

#[tokio::test]
async fn known_token_resolves_then_logs_out() {
    let app = TestApp::new().await;

    let hash = hash_password(PASSWORD).unwrap();
    sqlx::query("INSERT INTO users (id, name, password, type) VALUES (?, ?, ?, ?)")
        .bind(42_i64)
        .bind("bob")
        .bind(&hash)
        .bind(0_i64)
        .execute(app.state.pool.sqlite().unwrap())
        .await
        .unwrap();

    let sessions = SqlxSessionRepository::new(app.state.pool.clone());
    sessions
        .create(&Session {
            id: 0,
            user_id: 42,
            expiration: now() + 3600,
            token: "abc123".to_string(),
        })
        .await
        .unwrap();

    let signer = CookieSigner::new(app.config.session_secret()).unwrap();
    let cookie = format!("session_token={}", signer.sign("abc123"));

    let body = body_json(app.get("/", Some(&cookie)).await).await;
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["current_user"]["id"], 42);

    let response = app.post_empty("/logout", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(sessions.find_by_token("abc123").await.unwrap().is_none());
}

#[tokio::test]
async fn login_replaces_existing_session() {
    let app = TestApp::new().await;
    app.user("ana", UserType::Agent).await;
    let first = app.login("ana").await;

    let response = app
        .send(
            Request::post("/login")
                .header(header::COOKIE, &first)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(format!("name=ana&password={}", PASSWORD)))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let second = cookie_pair(&response).unwrap();

    assert_ne!(token_of(&first), token_of(&second));
    assert!(app
        .state
        .sessions
        .find_by_token(&token_of(&first))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn messages_follow_accept_language() {
    let app = TestApp::new().await;

    let response = app
        .send(
            Request::get("/me")
                .header(header::ACCEPT_LANGUAGE, "es-ES,es;q=0.9,en;q=0.8")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    let body = body_json(response).await;
    assert_eq!(body["error"]["message"], "Debes iniciar sesión");
}

#[tokio::test]
async fn foreign_origin_is_forbidden() {
    let app = TestApp::new().await;

    let response = app
        .send(
            Request::post("/logout")
                .header(header::HOST, "desk.local")
                .header(header::ORIGIN, "https://evil.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .send(
            Request::post("/logout")
                .header(header::HOST, "desk.local")
                .header(header::ORIGIN, "http://desk.local")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn path_traversal_is_rejected() {
    let app = TestApp::new().await;
    let response = app.get("/tickets/%2e%2e/users", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["message"], "Invalid path");
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let app = TestApp::new().await;
    let response = app.get("/nowhere", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn mounted_under_prefix() {
    let app = TestApp::with_config(Config {
        environment: Environment::Test,
        server: ServerConfig {
            mount_path: "/helpdesk".to_string(),
            ..Default::default()
        },
        ..Default::default()
    })
    .await;

    let response = app.get("/helpdesk", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.post_empty("/helpdesk/logout", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response).as_deref(), Some("/helpdesk"));

    assert_eq!(app.get("/", None).await.status(), StatusCode::NOT_FOUND);
}
