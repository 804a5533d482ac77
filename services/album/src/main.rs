use album_service::{start_api_server, AppState, Config, PgTravelStore, S3ObjectStore, TravelService};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load album configuration")?;

    init_tracing(&config.service.log_level);
    info!(
        service = %config.service.name,
        bucket = %config.s3.bucket,
        "Album service starting"
    );

    install_metrics_exporter(config.service.metrics_port)?;

    let state = build_state(&config).await?;
    start_api_server(state, &config.api, shutdown_signal()).await?;

    info!("Album service stopped");
    Ok(())
}

/// Connect the database and bucket and assemble the travel service
async fn build_state(config: &Config) -> Result<AppState> {
    let travels = Arc::new(
        PgTravelStore::new(&config.database)
            .await
            .context("Failed to open travel database")?,
    );
    if config.database.run_migrations {
        travels
            .run_migrations()
            .await
            .context("Failed to migrate travel database")?;
    }

    let photos = Arc::new(
        S3ObjectStore::new(&config.s3)
            .await
            .context("Failed to set up photo bucket client")?,
    );

    let db_pool = travels.pool().clone();
    let service = TravelService::new(travels, photos.clone(), photos.bucket());

    Ok(AppState {
        service: Arc::new(service),
        db_pool,
    })
}

/// JSON logs, filtered by `RUST_LOG` or the configured level
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .init();
}

fn install_metrics_exporter(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!(port, "Metrics exporter listening");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    };

    info!(signal = received, "Shutdown requested, draining requests");
}
