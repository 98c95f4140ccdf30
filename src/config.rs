//! Configuration management for Courier
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer built-in defaults, a `courier.toml` file, environment
//! variables and command-line arguments.

use crate::cli::Cli;
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, time::Duration};

/// The configuration file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "courier.toml";

/// Environment variables understood for compatibility with existing
/// deployments, and the configuration keys they map to.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("PORT", "server.port"),
    ("MAIL_HOST", "email.host"),
    ("MAIL_PORT", "email.port"),
    ("MAIL_USER", "email.username"),
    ("MAIL_PASSWORD", "email.password"),
    ("FIREBASE_PROJECT_ID", "push.project_id"),
    ("FIREBASE_CLIENT_EMAIL", "push.client_email"),
    ("FIREBASE_PRIVATE_KEY", "push.private_key"),
];

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// The logging level, used when `RUST_LOG` is not set.
    pub log_level: String,
    /// The log output format.
    #[serde(default)]
    pub log_format: LogFormat,
    /// Configuration for the HTTP API.
    pub server: ServerConfig,
    /// Configuration for the email channel.
    pub email: EmailConfig,
    /// Configuration for the push channel.
    pub push: PushConfig,
    /// Configuration for the dispatch coordinator.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Configuration for the Prometheus endpoint.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// The format of log records written to stdout.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Configuration for the HTTP API.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// The interface to bind.
    pub host: String,
    /// The port to bind. Port 0 picks a free port.
    pub port: u16,
}

impl ServerConfig {
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// How the SMTP connection is secured.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Plain text connection.
    None,
    /// Upgrade with STARTTLS when the server offers it.
    #[default]
    Opportunistic,
    /// Require STARTTLS.
    StartTls,
    /// Implicit TLS from the first byte.
    Tls,
}

/// Configuration for the email channel.
#[derive(Deserialize, Serialize, Clone)]
pub struct EmailConfig {
    /// The SMTP relay host. The email channel is disabled when unset.
    pub host: Option<String>,
    /// The SMTP relay port.
    pub port: u16,
    /// SMTP username; only used together with `password`.
    pub username: Option<String>,
    /// SMTP password; only used together with `username`.
    pub password: Option<String>,
    /// Transport security.
    #[serde(default)]
    pub security: SmtpSecurity,
    /// Per-delivery timeout in milliseconds.
    pub timeout_ms: u64,
    /// The directory template references are resolved against.
    pub template_dir: PathBuf,
}

impl EmailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("security", &self.security)
            .field("timeout_ms", &self.timeout_ms)
            .field("template_dir", &self.template_dir)
            .finish()
    }
}

/// Configuration for the push channel (Firebase Cloud Messaging).
#[derive(Deserialize, Serialize, Clone)]
pub struct PushConfig {
    /// The Firebase project id.
    pub project_id: Option<String>,
    /// The service account email.
    pub client_email: Option<String>,
    /// The service account RSA private key in PEM form.
    pub private_key: Option<String>,
    /// The OAuth2 token endpoint.
    pub token_uri: String,
    /// The base URL of the FCM HTTP v1 API.
    pub api_base: String,
    /// Per-delivery timeout in milliseconds.
    pub timeout_ms: u64,
}

impl PushConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl fmt::Debug for PushConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushConfig")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &self.private_key.as_ref().map(|_| "***"))
            .field("token_uri", &self.token_uri)
            .field("api_base", &self.api_base)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Configuration for the dispatch coordinator.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DispatchConfig {
    /// Answer a request naming no channel with an empty report instead of a
    /// client error.
    #[serde(default)]
    pub allow_empty_requests: bool,
}

/// Configuration for the Prometheus endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct MetricsConfig {
    /// Serve `/metrics` from the API listener.
    #[serde(default)]
    pub enabled: bool,
}

impl Config {
    /// Loads the configuration by layering defaults, the TOML file, the
    /// environment and the command-line arguments, in that order.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        figment = match &cli.config {
            Some(path) => {
                if !path.exists() {
                    bail!(
                        "Config file not found at specified path: {}",
                        path.display()
                    );
                }
                figment.merge(Toml::file(path))
            }
            None => figment.merge(Toml::file(DEFAULT_CONFIG_FILE)),
        };

        let config: Config = figment
            // e.g. COURIER_PUSH__PROJECT_ID=my-project
            .merge(Env::prefixed("COURIER_").split("__"))
            .merge(legacy_env())
            .merge(cli.clone())
            .extract()?;
        Ok(config)
    }
}

fn legacy_env() -> Env {
    let keys: Vec<&str> = LEGACY_ENV.iter().map(|(var, _)| *var).collect();
    Env::raw().only(&keys).map(|key| {
        LEGACY_ENV
            .iter()
            .find(|(var, _)| key.as_str().eq_ignore_ascii_case(var))
            .map(|(_, path)| (*path).into())
            .unwrap_or_else(|| key.as_str().to_ascii_lowercase().into())
    })
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            email: EmailConfig {
                host: None,
                port: 587,
                username: None,
                password: None,
                security: SmtpSecurity::Opportunistic,
                timeout_ms: 10_000,
                template_dir: PathBuf::from("templates"),
            },
            push: PushConfig {
                project_id: None,
                client_email: None,
                private_key: None,
                token_uri: "https://oauth2.googleapis.com/token".to_string(),
                api_base: "https://fcm.googleapis.com".to_string(),
                timeout_ms: 10_000,
            },
            dispatch: DispatchConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}
