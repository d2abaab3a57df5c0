use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sessiongate::{
    config::Config,
    repositories::memory::MemoryUserStore,
    routes::build_router,
    services::token_auth::{StaticTokenSource, TokenSource},
    state::{AppState, Collaborators},
};

/// Cancels `shutdown` on Ctrl-C or SIGTERM.
async fn listen_for_shutdown(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("❌ Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("❌ Failed to listen for SIGTERM: {}", e);
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
    tracing::info!("🛑 Shutdown signal received");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let users = Arc::new(MemoryUserStore::new());
    let tokens: Option<Arc<dyn TokenSource>> = if config.api_tokens.is_empty() {
        None
    } else {
        Some(Arc::new(StaticTokenSource::new(config.api_tokens.clone())))
    };
    let collaborators = Collaborators {
        password_users: Some(users.clone()),
        oauth_users: Some(users),
        tokens,
    };

    let state = AppState::new(&config, collaborators)?;
    tracing::info!("✅ AppState initialized");

    let app = build_router(state.clone());

    let shutdown = CancellationToken::new();
    tokio::spawn(listen_for_shutdown(shutdown.clone()));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("🚀 Server listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    state.revocation.stop();
    tracing::info!("✅ Revocation sweep stopped, bye");
    Ok(())
}
