//! Billing service entry point.

use billing_service::config::Config;
use billing_service::services::init_metrics;
use billing_service::Application;
use service_core::observability::init_tracing;
use tokio::signal;

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info,billing_service=debug");

    let config = Config::from_env().expect("Failed to load configuration");

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting billing-service"
    );

    init_metrics();

    tracing::info!(
        service_name = %config.service_name,
        http_port = config.server.port,
        db_name = %config.database.db_name,
        sweep_interval_secs = ?config.jobs.sweep_interval_secs,
        strict_bookkeeping = config.policy.strict_bookkeeping,
        drift_tolerance = config.policy.drift_tolerance,
        "Configuration loaded"
    );

    let app = Application::build(config).await?;

    tokio::select! {
        result = app.run_until_stopped() => result?,
        _ = shutdown_signal() => {
            tracing::info!("Graceful shutdown initiated");
        }
    }

    tracing::info!("Service shutdown complete");
    Ok(())
}
