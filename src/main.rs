use std::sync::Arc;

use anyhow::Context;
use axum::{http::HeaderValue, Router};
use meroghar::{
    auth, config::Config, conversations, db, directory, feed::Feed, moderation, pages,
    policy::DbPolicy, profiles, AppState,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(config.public_url.starts_with("https://"))
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(config.session_idle_minutes)));

    let cors = CorsLayer::new().allow_origin(
        config
            .public_url
            .parse::<HeaderValue>()
            .context("PUBLIC_URL is not a valid origin")?,
    );

    let db_pool = db::connect(&config).await?;
    let clients = auth::Clients::load(&config.client_secrets, &config.public_url)?;

    let app_state = AppState {
        policy: DbPolicy::shared(db_pool.clone()),
        feed: Feed::new(config.feed_capacity),
        db_pool,
        clients,
        config: Arc::new(config.clone()),
    };

    let app = Router::new()
        .merge(pages::router())
        .merge(auth::router())
        .merge(directory::router())
        .merge(profiles::router())
        .merge(conversations::router())
        .merge(moderation::router())

        .with_state(app_state)
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, public_url = %config.public_url, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
