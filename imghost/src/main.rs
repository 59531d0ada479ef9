use clap::Parser;
use imghost::{Application, Config, config::Args, telemetry};
use tokio::signal;

/// Resolves on the first Ctrl+C or SIGTERM. The server then stops accepting connections and lets
/// uploads that are already streaming finish.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        _ = interrupt => "Ctrl+C",
        _ = terminate => "SIGTERM",
    };
    tracing::info!(signal = received, "Shutting down, draining in-flight uploads");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args)?;

    if args.validate {
        println!(
            "Configuration is valid: storing uploads in {}, served under {}.",
            config.storage.root.display(),
            config.storage.mount_path()
        );
        return Ok(());
    }

    telemetry::init_telemetry(config.enable_otel_export)?;
    tracing::debug!(config_file = %args.config, "Loaded configuration");

    let app = Application::new(config).await?;
    app.serve(shutdown_signal()).await
}
