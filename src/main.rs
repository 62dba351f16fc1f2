use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use feature_desk::app_state::AppState;
use feature_desk::build_router;
use feature_desk::config::Config;
use feature_desk::db::pool::get_db_pool;
use feature_desk::db::queries::requests::PgRequestStore;
use feature_desk::middleware::auth::create_principal_cache;
use feature_desk::utils::notification::{EmailNotifier, LogNotifier, NotificationSink};
use feature_desk::workflow::RequestEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::install(Config::from_env().context("Invalid configuration")?);

    std::fs::create_dir_all(&config.log_dir).context("Failed to create logs directory")?;
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "feature-desk.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .init();

    let pool = get_db_pool(&config)
        .await
        .context("Failed to connect to the database")?;
    info!("Database ready, migrations applied");

    let notifier: Arc<dyn NotificationSink> = match config.notify.clone() {
        Some(notify) => {
            info!(endpoint = %notify.endpoint, "Sending new-request mail notifications");
            Arc::new(EmailNotifier::new(notify, config.app_url.clone()))
        }
        None => Arc::new(LogNotifier),
    };
    let engine = RequestEngine::new(Arc::new(PgRequestStore::new(pool.clone())), notifier);

    let state = AppState {
        pool: pool.clone(),
        engine,
        principals: create_principal_cache(config.principal_cache_ttl),
        config: Arc::clone(&config),
    };
    let app = build_router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Server running at http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server encountered an error")?;

    info!("🛠️ Closing database pool...");
    pool.close().await;
    info!("✅ Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Received Ctrl+C, shutting down...");
}
