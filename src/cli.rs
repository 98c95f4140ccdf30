//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged on top of
//! the configuration from `courier.toml` and the environment.

use clap::Parser;
use figment::{
    providers::Serialized,
    value::{Dict, Map},
    Error, Metadata, Profile, Provider,
};
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use std::path::PathBuf;

/// A multi-channel notification dispatcher for email and push.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Interface the HTTP API binds to.
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Port the HTTP API listens on.
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub json_logs: bool,

    /// Serve Prometheus metrics at /metrics.
    #[arg(long)]
    pub metrics: bool,

    /// Answer requests naming no channel with an empty report.
    #[arg(long)]
    pub allow_empty_requests: bool,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut overrides = JsonMap::new();

        let mut server = JsonMap::new();
        if let Some(host) = &self.host {
            server.insert("host".into(), json!(host));
        }
        if let Some(port) = self.port {
            server.insert("port".into(), json!(port));
        }
        if !server.is_empty() {
            overrides.insert("server".into(), JsonValue::Object(server));
        }

        if let Some(level) = &self.log_level {
            overrides.insert("log_level".into(), json!(level));
        }

        // Flags only override when present, so `false` never masks the file.
        if self.json_logs {
            overrides.insert("log_format".into(), json!("json"));
        }
        if self.metrics {
            overrides.insert("metrics".into(), json!({ "enabled": true }));
        }
        if self.allow_empty_requests {
            overrides.insert("dispatch".into(), json!({ "allow_empty_requests": true }));
        }

        Serialized::defaults(JsonValue::Object(overrides)).data()
    }
}
