use std::net::SocketAddr;
use std::path::PathBuf;

use axum::routing::get;
use quire::config::Configuration;
use tokio::net::TcpListener;
use tokio::signal;

const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = std::env::var(CONFIG_PATH_ENV).map(PathBuf::from).unwrap_or_default();
    let config = Configuration::default().path(path).read()?;

    quire::telemetry::init(&config.telemetry)?;

    let state = quire::initialize_state(config.clone()).await?;
    let mut app = quire::app(state);

    if config.telemetry.prometheus {
        let handle = quire::telemetry::setup_metrics_recorder()?;
        // `GET /metrics` exposes Prometheus metrics.
        app = app.route("/metrics", get(move || std::future::ready(handle.render())));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port()));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, name = %config.name, "server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}
