use hearthgate_identity::memory::{InMemorySessionStore, InMemoryUserDirectory};
use hearthgate_identity::{SessionLifecycle, SessionStore, UserDirectory};
use hearthgate_server::{
    app,
    auth::AppState,
    config::ServerConfig,
    db::{PgSessionStore, PgUserDirectory},
    oauth::OAuthClient,
};
use sqlx::postgres::PgPoolOptions;
use std::{process::ExitCode, sync::Arc, time::Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            tracing::error!("{message}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), String> {
    // Load configuration from environment
    let config =
        ServerConfig::from_env().map_err(|e| format!("failed to load configuration: {e}"))?;
    tracing::info!("Loaded configuration");

    let (directory, store) = stores(&config).await?;

    let provider = OAuthClient::new(config.auth.provider().clone())
        .map_err(|e| format!("failed to configure OAuth client: {}", e.current_context()))?;

    let app_state = Arc::new(AppState::new(
        directory,
        store,
        Arc::new(provider),
        &config.auth,
        config.session.clone(),
    ));

    spawn_session_cleanup(
        app_state.lifecycle.clone(),
        config.session.cleanup_interval_seconds,
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .map_err(|e| format!("failed to bind to {}: {e}", config.bind_address))?;

    tracing::info!("listening on http://{}", config.bind_address);

    axum::serve(listener, app::router(app_state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("server error: {e}"))
}

/// Picks Postgres-backed stores when a database is configured, in-memory
/// stores otherwise.
async fn stores(
    config: &ServerConfig,
) -> Result<(Arc<dyn UserDirectory>, Arc<dyn SessionStore>), String> {
    let Some(database_url) = &config.database_url else {
        tracing::warn!("No database configured, users and sessions are kept in memory");
        let directory: Arc<dyn UserDirectory> =
            Arc::new(InMemoryUserDirectory::new(config.auth.resource()));
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        return Ok((directory, store));
    };

    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|e| format!("failed to connect to database: {e}"))?;

    tracing::info!("Ensuring database schema...");
    let directory = PgUserDirectory::new(db_pool.clone(), config.auth.resource())
        .map_err(|e| format!("invalid user directory: {e}"))?;
    directory
        .ensure_schema()
        .await
        .map_err(|e| format!("failed to create user tables: {e}"))?;
    let store = PgSessionStore::new(db_pool);
    store
        .ensure_schema()
        .await
        .map_err(|e| format!("failed to create session table: {e}"))?;

    let directory: Arc<dyn UserDirectory> = Arc::new(directory);
    let store: Arc<dyn SessionStore> = Arc::new(store);
    Ok((directory, store))
}

/// Purges expired sessions once at startup, then every `interval_secs`.
fn spawn_session_cleanup(lifecycle: SessionLifecycle, interval_secs: u64) {
    tokio::spawn(async move {
        // The first tick completes immediately.
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            interval.tick().await;
            match lifecycle.purge_expired().await {
                Ok(count) if count > 0 => {
                    tracing::debug!(deleted_sessions = count, "Session cleanup");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e.current_context(), "Failed to cleanup expired sessions");
                }
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
