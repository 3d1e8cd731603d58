//! Plateful - Food Ordering Platform Backend
//! Mission: Authentication core and security middleware for the ordering API

use anyhow::{Context, Result};
use dotenv::dotenv;
use plateful_backend::{
    app::build_router,
    auth::{AuthService, AuthState, CredentialStore, SessionStore, TokenIssuer},
    config::AppConfig,
    middleware::{RateLimitConfig, RateLimitLayer, SpeedLimitConfig, SpeedLimitLayer},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, time::interval};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    info!("🚀 Plateful backend starting");

    // Fatal on absent or weak signing secrets.
    let config = AppConfig::from_env()?;

    let store = Arc::new(CredentialStore::new(&config.db_path)?);
    info!("🔐 Credential store initialized at: {}", config.db_path);

    let tokens = Arc::new(TokenIssuer::new(
        config.access_token_secret.clone(),
        config.refresh_token_secret.clone(),
    ));
    let sessions = Arc::new(SessionStore::new());
    let auth = Arc::new(AuthService::new(
        store.clone(),
        tokens.clone(),
        sessions.clone(),
    ));

    let auth_state = AuthState {
        auth,
        store: store.clone(),
        sessions,
    };

    let general_limiter = RateLimitLayer::new(RateLimitConfig::general());
    let auth_limiter = RateLimitLayer::new(RateLimitConfig::auth());
    let speed_limiter = SpeedLimitLayer::new(SpeedLimitConfig::default());

    // Periodic pruning of limiter counters and expired refresh rows.
    tokio::spawn(housekeeping(
        store,
        general_limiter.clone(),
        auth_limiter.clone(),
        speed_limiter.clone(),
    ));

    let app = build_router(
        auth_state,
        tokens,
        general_limiter,
        auth_limiter,
        speed_limiter,
    );

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("🎯 API server listening on {}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plateful_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn housekeeping(
    store: Arc<CredentialStore>,
    general_limiter: RateLimitLayer,
    auth_limiter: RateLimitLayer,
    speed_limiter: SpeedLimitLayer,
) {
    let mut ticker = interval(Duration::from_secs(15 * 60));

    loop {
        ticker.tick().await;

        general_limiter.cleanup();
        auth_limiter.cleanup();
        speed_limiter.cleanup();

        match store.delete_expired_refresh_tokens() {
            Ok(n) if n > 0 => info!("🧹 Pruned {} expired refresh tokens", n),
            Ok(_) => {}
            Err(e) => warn!("Refresh-token pruning failed: {e:#}"),
        }
    }
}
