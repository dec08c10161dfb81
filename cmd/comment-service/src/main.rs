//! # comment-service
//!
//! The entry point that assembles the service from its adapters based on
//! configuration and compile-time features.

use std::sync::Arc;

use anyhow::Context;
use api_adapters::{router, AppState};
use configs::{DatabaseBackend, LogFormat, Settings, TelemetrySettings};
use domains::CommentRepository;
use services::{CommentService, RateLimitPolicy, SlidingWindowLimiter};
use storage_adapters::InMemoryCommentRepository;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    init_tracing(&settings.telemetry);

    // 1. Persistence
    let repo = build_repository(&settings).await?;

    // 2. Identity throttling, with its sweeper running beside the server
    let rl = &settings.rate_limit;
    let policy = RateLimitPolicy::new(rl.max_actions, rl.window(), rl.retention(), rl.sweep_interval())?;
    let limiter = Arc::new(SlidingWindowLimiter::new(policy));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Arc::clone(&limiter).spawn_sweeper(shutdown_rx);

    // 3. Use cases and routes
    let service = CommentService::new(repo, limiter)
        .with_max_content_chars(settings.comments.max_content_chars);
    let app = router(AppState::new(Arc::new(service)));

    let addr = settings.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "comment service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        warn!(error = %e, "rate limit sweeper ended abnormally");
    }
    Ok(())
}

fn init_tracing(telemetry: &TelemetrySettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&telemetry.log_filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match telemetry.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn build_repository(settings: &Settings) -> anyhow::Result<Arc<dyn CommentRepository>> {
    match settings.database.backend {
        DatabaseBackend::Memory => {
            info!("using in-memory comment store; comments are lost on restart");
            Ok(Arc::new(InMemoryCommentRepository::new()))
        }
        #[cfg(feature = "db-sqlite")]
        DatabaseBackend::Sqlite => {
            use secrecy::ExposeSecret;

            let repo = storage_adapters::SqliteCommentRepository::connect(
                settings.database.url.expose_secret(),
                settings.database.max_connections,
            )
            .await
            .context("opening sqlite comment store")?;
            Ok(Arc::new(repo))
        }
        #[cfg(not(feature = "db-sqlite"))]
        DatabaseBackend::Sqlite => {
            anyhow::bail!("database.backend = sqlite requires the db-sqlite feature")
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
