//! UMR plugin host
//!
//! Loads configuration, discovers and starts plugins, then runs until a
//! shutdown signal arrives and unloads everything.

use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{EnvFilter, fmt};

use umr_core::config::AppConfig;
use umr_core::error::AppError;
use umr_plugin::{PluginEvent, PluginManager};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Host error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let config_path = std::env::var("UMR_CONFIG").unwrap_or_else(|_| "config/default".to_string());
    let env = std::env::var("UMR_ENV").unwrap_or_else(|_| "development".to_string());

    AppConfig::load(&config_path, &env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting UMR plugin host v{}", env!("CARGO_PKG_VERSION"));

    let manager = PluginManager::new(config.plugins);
    plugin_no_eval::register(&manager);

    let events = manager.subscribe();
    let listener = tokio::spawn(log_plugin_events(events));

    let summary = manager.initialize().await;
    tracing::info!(
        discovered = summary.discovered,
        loaded = summary.loaded.len(),
        activated = summary.activated.len(),
        failed = summary.failures.len(),
        "Plugin host ready"
    );
    for failure in &summary.failures {
        tracing::warn!(path = %failure.path.display(), error = %failure.error, "Plugin failed to start");
    }

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, unloading plugins...");

    manager.unload_all().await;
    listener.abort();

    tracing::info!("UMR plugin host stopped");
    Ok(())
}

/// Mirror lifecycle notifications into the log
async fn log_plugin_events(mut events: tokio::sync::broadcast::Receiver<PluginEvent>) {
    loop {
        match events.recv().await {
            Ok(PluginEvent::Error { plugin_id, error }) => {
                tracing::warn!(plugin_id = %plugin_id, error = %error, "plugin:error");
            }
            Ok(event) => {
                tracing::debug!(plugin_id = %event.plugin_id(), "{}", event.name());
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Plugin event listener lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
