// src/main.rs
use axum::{routing::get, Router};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use statsd_profiler::config::Settings;
use statsd_profiler::Profiler;

mod handlers;

use handlers::health::health_check;
use handlers::users::get_user;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Settings::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::new(&cfg.logging.level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(?cfg, "Loaded configuration");

    let profiler = Profiler::new(cfg.profiler_config());

    let app = Router::new()
        .route("/healthz", get(health_check))
        .route("/users/{id}", get(get_user))
        .with_state(profiler.clone())
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(profiler.layer()),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
    tracing::info!(%addr, "Server running");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install terminate signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    #[cfg(not(unix))]
    ctrl_c.await;

    tracing::info!("Shutdown signal received");
}
