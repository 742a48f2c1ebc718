//! indexswap API server.
//!
//! This is the main entry point for the service. It hosts the HTTP API and
//! the session engine in one process.
//!
//! # Storage
//!
//! Set `DATA_DIR` to keep sessions in `RocksDB` across restarts. Sessions
//! left `Processing` by a previous run are resumed on startup. Without
//! `DATA_DIR`, sessions live in memory only.
//!
//! # Registration System
//!
//! Set `REGISTRAR_URL` to the registration system's HTTP endpoint. Without
//! it, no index ever reports a vacancy.
//!
//! # Dev Mode
//!
//! Build with `--features dev-mode` to accept `test-token:<owner-hex>`
//! bearer tokens instead of signed ones.

use std::sync::Arc;

use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "dev-mode")]
use indexswap_auth::MockTokenValidator;
use indexswap_api::{create_router, ApiConfig, AppState};
use indexswap_auth::TokenService;
use indexswap_engine::{
    HttpRegistrationGateway, NoopRegistrationGateway, RegistrationGateway, SwapSessionManager,
};
use indexswap_store::{MemoryStore, RocksStore, Store};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,indexswap=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting indexswap API");

    let config = ApiConfig::from_env();
    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = ?config.data_dir,
        registrar_url = ?config.registrar_url,
        poll_interval_secs = config.engine.poll_interval.as_secs(),
        session_ttl_secs = config.engine.session_ttl.as_secs(),
        "Configuration loaded"
    );

    match config.data_dir.clone() {
        Some(dir) => {
            tracing::info!(path = %dir, "Opening RocksDB store");
            let store = Arc::new(RocksStore::open(&dir)?);
            with_store(config, store).await
        }
        None => {
            tracing::warn!("No DATA_DIR set - sessions are kept in memory only");
            with_store(config, Arc::new(MemoryStore::new())).await
        }
    }
}

async fn with_store<S>(config: ApiConfig, store: Arc<S>) -> Result<(), BoxError>
where
    S: Store + 'static,
{
    match config.registrar_url.clone() {
        Some(url) => {
            tracing::info!(registrar_url = %url, "Registration gateway enabled");
            serve(config, store, Arc::new(HttpRegistrationGateway::new(url))).await
        }
        None => {
            tracing::warn!("No REGISTRAR_URL set - no index will ever report a vacancy");
            serve(config, store, Arc::new(NoopRegistrationGateway::new())).await
        }
    }
}

async fn serve<S, G>(config: ApiConfig, store: Arc<S>, gateway: Arc<G>) -> Result<(), BoxError>
where
    S: Store + 'static,
    G: RegistrationGateway + 'static,
{
    let manager = Arc::new(SwapSessionManager::new(
        store,
        gateway,
        config.engine.clone(),
    ));
    manager.recover()?;

    let purger = Arc::clone(&manager);
    let purge_interval = config.purge_interval();
    let purge_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(purge_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = purger.purge_expired(Utc::now()) {
                tracing::warn!(error = %e, "Session purge failed");
            }
        }
    });

    let tokens = Arc::new(TokenService::new(config.auth_config()));

    #[cfg(feature = "dev-mode")]
    let validator = {
        tracing::warn!("DEV MODE ENABLED - using mock token validator");
        tracing::warn!("Use tokens in format: test-token:<owner-hex>");
        Arc::new(MockTokenValidator)
    };

    #[cfg(not(feature = "dev-mode"))]
    let validator = Arc::clone(&tokens);

    let listen_addr = config.listen_addr.clone();
    let state = AppState::new(Arc::clone(&manager), tokens, validator, config);
    let app = create_router(state);

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    purge_task.abort();
    manager.shutdown().await;
    tracing::info!("indexswap API stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
