//! Roberts - A small help desk

use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roberts::{
    api::{self, AppState},
    config::Config,
    db,
    services::{build_mailer, Translator},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roberts=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Roberts help desk...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded ({:?})", config.environment);

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let translator = Translator::load(&config.i18n)?;
    let mailer = build_mailer(&config.mail)?;

    let state = AppState::new(&config, pool, mailer, translator)?;

    // First administrator on an empty database
    if let Some(admin) = &config.bootstrap_admin {
        match state
            .user_service
            .bootstrap_admin(&admin.name, &admin.password)
            .await?
        {
            Some(user) => tracing::info!("Created first administrator {}", user.name),
            None => tracing::debug!("Users exist, skipping administrator bootstrap"),
        }
    }

    // Expired session cleanup
    if config.session.sweep_interval_seconds > 0 {
        state
            .sessions
            .clone()
            .spawn_sweeper(Duration::from_secs(config.session.sweep_interval_seconds));
    }

    let app = api::build_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
