use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use dotenvy::dotenv;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use songcraft_api::config::Config;
use songcraft_api::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "songcraft_api=debug,credit_ledger=debug,rate_limiter=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!(
        environment = %config.environment,
        rate_limit_backend = ?config.rate_limit_backend,
        "Loaded configuration"
    );

    if config.is_production() && (config.admin_api_token.is_none() || config.webhook_secret.is_none()) {
        tracing::warn!("ADMIN_API_TOKEN or WEBHOOK_SECRET unset in production, those endpoints will reject every request");
    }

    let state = AppState::from_config(&config).await?;
    let _sweeper = state.rate_limiters.spawn_sweeper(config.rate_limit_sweep_interval);

    let app = songcraft_api::router(state).layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(CorsLayer::permissive())
            .layer(DefaultBodyLimit::max(64 * 1024)),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
