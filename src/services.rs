//! Encapsulation for setting up external services.
//!
//! Each channel's provider state is decided here, once, at startup.

use crate::{
    config::{Config, EmailConfig, MetricsConfig},
    core::ProviderState,
    notification::{
        EmailAdapter, FcmClient, MailTransport, PushAdapter, PushCredentials, PushTransport,
        SmtpMailer, TemplateStore,
    },
};
use anyhow::{Context, Result};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Builds the email adapter. The channel is disabled when no SMTP host is
/// configured.
pub fn init_email_adapter(config: &EmailConfig) -> Result<EmailAdapter> {
    let state = match config.host.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
        Some(host) => {
            let mailer = SmtpMailer::new(host, config)
                .with_context(|| format!("failed to configure SMTP transport for {host}"))?;
            info!(host, port = config.port, security = ?config.security, "Email notifications enabled.");
            ProviderState::Ready(Arc::new(mailer) as Arc<dyn MailTransport>)
        }
        None => {
            warn!("SMTP host not set; email notifications are disabled.");
            ProviderState::Disabled
        }
    };
    Ok(email_adapter_with(state, config))
}

/// Builds the email adapter around an already constructed transport.
pub fn email_adapter_with(
    state: ProviderState<Arc<dyn MailTransport>>,
    config: &EmailConfig,
) -> EmailAdapter {
    EmailAdapter::new(
        state,
        TemplateStore::new(config.template_dir.clone()),
        config.timeout(),
    )
}

/// Builds the push adapter from the configured service account.
///
/// Missing credentials disable push; credentials that are present but
/// unusable fail startup.
pub fn init_push_adapter(config: &Config) -> Result<PushAdapter> {
    let push = &config.push;
    PushAdapter::from_credentials(
        PushCredentials::from_config(push),
        push.timeout(),
        |credentials| {
            let client = FcmClient::new(credentials, push)?;
            Ok(Arc::new(client) as Arc<dyn PushTransport>)
        },
    )
}

/// Installs the global Prometheus recorder when metrics are enabled.
///
/// A recorder that cannot be installed is logged and metrics stay off.
pub fn init_metrics(config: &MetricsConfig) -> Option<PrometheusHandle> {
    if !config.enabled {
        return None;
    }

    let builder = match PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Suffix("duration_seconds".to_string()),
        &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
    ) {
        Ok(builder) => builder,
        Err(e) => {
            error!("Invalid Prometheus bucket configuration: {}", e);
            return None;
        }
    };

    match builder.install_recorder() {
        Ok(handle) => {
            info!("Prometheus metrics enabled at /metrics.");
            Some(handle)
        }
        Err(e) => {
            error!("Failed to install Prometheus recorder: {}", e);
            None
        }
    }
}
