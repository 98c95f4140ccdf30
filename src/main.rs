//! Courier - Multi-channel notification dispatcher
//!
//! Accepts notification requests over HTTP and delivers them by email and
//! push, reporting the outcome of every delivery.

use anyhow::Result;
use clap::Parser;
use courier::{
    app::App,
    cli::Cli,
    config::{Config, LogFormat},
};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            init_tracing("info", LogFormat::Pretty);
            error!("Failed to load configuration: {:#}", err);
            std::process::exit(1);
        }
    };

    init_tracing(&config.log_level, config.log_format);

    info!("Courier starting up...");
    log_config_summary(&config);

    // =========================================================================
    // Create Shutdown Channel
    // =========================================================================
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = App::builder(config).build(shutdown_rx).await?;
    info!("Listening on http://{}", app.local_addr());

    let app_handle = tokio::spawn(app.run());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Shutting down gracefully...");
    shutdown_tx.send(true).ok();

    app_handle.await??;
    info!("All tasks shut down. Exiting.");
    Ok(())
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    let result = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    if let Err(e) = result {
        eprintln!("Failed to install tracing subscriber: {e}");
    }
}

fn log_config_summary(config: &Config) {
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Listen Address: {}", config.server.listen_address());
    match &config.email.host {
        Some(host) => info!(
            "SMTP Relay: {}:{} ({:?}, credentials {})",
            host,
            config.email.port,
            config.email.security,
            if config.email.username.is_some() && config.email.password.is_some() {
                "set"
            } else {
                "not set"
            }
        ),
        None => info!("SMTP Relay: Not configured"),
    }
    info!("Template Directory: {}", config.email.template_dir.display());
    info!(
        "Push Project: {}",
        config.push.project_id.as_deref().unwrap_or("Not configured")
    );
    info!(
        "Empty Requests: {}",
        if config.dispatch.allow_empty_requests {
            "Allowed"
        } else {
            "Rejected"
        }
    );
    info!(
        "Metrics: {}",
        if config.metrics.enabled {
            "Enabled"
        } else {
            "Disabled"
        }
    );
    info!("-------------------------------------------------------");
}
