mod accounts;
mod config;
mod constants;
mod routes;
mod runner;
mod services;
mod validate;

use sqlx::postgres::PgPoolOptions;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use accounts::CredentialStore;
use runner::RunnerPolicy;
use services::audit::PgAuditStore;
use services::twitter::TwitterClient;

#[derive(Clone)]
pub struct AppState {
    pub audit: PgAuditStore,
    pub twitter: TwitterClient,
    pub accounts: CredentialStore,
    pub policy: RunnerPolicy,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let config_path =
        std::env::var("VOLLEY_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let cfg = config::load(Some(Path::new(&config_path)))
        .unwrap_or_else(|e| panic!("Failed to load {config_path}: {e}"));

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.app.database_url.clone());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let state = Arc::new(AppState {
        audit: PgAuditStore::new(pool),
        twitter: TwitterClient::new(),
        accounts: CredentialStore::from_config(&cfg.accounts),
        policy: cfg.runner.policy(),
    });

    let app = routes::build_routes()
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&cfg.app.bind_addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {}: {}", cfg.app.bind_addr, e));

    info!(addr = %cfg.app.bind_addr, accounts = state.accounts.len(), "listening");
    axum::serve(listener, app).await.expect("Server failed");
}
