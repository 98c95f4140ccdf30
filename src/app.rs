//! The main application logic, decoupled from the entry point.

use crate::{
    config::Config,
    core::{EmailSender, ProviderState, PushSender},
    dispatch::Dispatcher,
    notification::{MailTransport, PushAdapter, PushTransport},
    server::{self, AppState, ChannelStatus},
    services,
    task_manager::TaskManager,
};
use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, instrument};

/// A handle to the running application.
pub struct App {
    task_manager: TaskManager,
    local_addr: SocketAddr,
    channels: ChannelStatus,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The address the HTTP API is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn channels(&self) -> ChannelStatus {
        self.channels
    }

    /// Waits for the shutdown signal and then gracefully shuts down all tasks.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.shutdown_rx();
        if !*shutdown_rx.borrow() {
            shutdown_rx.changed().await.ok();
        }
        info!("Shutdown signal received. Waiting for tasks to complete...");

        self.task_manager.shutdown().await;

        info!("Courier stopped.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// Every network-facing component can be replaced, so tests can run the full
/// HTTP stack against in-memory backends.
pub struct AppBuilder {
    config: Config,
    email_sender_override: Option<Arc<dyn EmailSender>>,
    push_sender_override: Option<Arc<dyn PushSender>>,
    mail_transport_override: Option<Arc<dyn MailTransport>>,
    push_transport_override: Option<Arc<dyn PushTransport>>,
    metrics_handle_override: Option<PrometheusHandle>,
}

impl AppBuilder {
    /// Creates a new `AppBuilder` with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            email_sender_override: None,
            push_sender_override: None,
            mail_transport_override: None,
            push_transport_override: None,
            metrics_handle_override: None,
        }
    }

    /// Replaces the whole email channel. `/health` reports whatever the
    /// sender's `is_configured` says.
    pub fn email_sender_override(mut self, sender: Arc<dyn EmailSender>) -> Self {
        self.email_sender_override = Some(sender);
        self
    }

    /// Replaces the whole push channel. `/health` reports whatever the
    /// sender's `is_configured` says.
    pub fn push_sender_override(mut self, sender: Arc<dyn PushSender>) -> Self {
        self.push_sender_override = Some(sender);
        self
    }

    /// Keeps the real email adapter but delivers through `transport`.
    pub fn mail_transport_override(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.mail_transport_override = Some(transport);
        self
    }

    /// Keeps the real push adapter but delivers through `transport`.
    pub fn push_transport_override(mut self, transport: Arc<dyn PushTransport>) -> Self {
        self.push_transport_override = Some(transport);
        self
    }

    /// Serves `/metrics` from `handle` instead of installing a global recorder.
    pub fn metrics_handle_override(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle_override = Some(handle);
        self
    }

    /// Builds all components, binds the listener and starts the HTTP API.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        let task_manager = TaskManager::new(shutdown_rx);

        // =========================================================================
        // 1. Metrics
        // =========================================================================
        let metrics = match self.metrics_handle_override {
            Some(handle) => Some(handle),
            None => services::init_metrics(&config.metrics),
        };

        // =========================================================================
        // 2. Channel adapters
        // =========================================================================
        let email: Arc<dyn EmailSender> =
            match (self.email_sender_override, self.mail_transport_override) {
                (Some(sender), _) => sender,
                (None, Some(transport)) => Arc::new(services::email_adapter_with(
                    ProviderState::Ready(transport),
                    &config.email,
                )),
                (None, None) => Arc::new(services::init_email_adapter(&config.email)?),
            };

        let push: Arc<dyn PushSender> =
            match (self.push_sender_override, self.push_transport_override) {
                (Some(sender), _) => sender,
                (None, Some(transport)) => Arc::new(PushAdapter::new(
                    ProviderState::Ready(transport),
                    config.push.timeout(),
                )),
                (None, None) => Arc::new(services::init_push_adapter(&config)?),
            };

        let channels = ChannelStatus {
            email: email.is_configured(),
            push: push.is_configured(),
        };

        let dispatcher =
            Dispatcher::new(email, push).allow_empty_requests(config.dispatch.allow_empty_requests);

        // =========================================================================
        // 3. HTTP API
        // =========================================================================
        let listen_address = config.server.listen_address();
        let listener = TcpListener::bind(&listen_address)
            .await
            .with_context(|| format!("failed to bind HTTP API to {listen_address}"))?;
        let local_addr = listener.local_addr()?;

        let router = server::router(AppState {
            dispatcher,
            channels,
            metrics,
        });
        task_manager.spawn(
            "HttpServer",
            server::serve(listener, router, task_manager.shutdown_rx()),
        );

        info!(
            %local_addr,
            email = channels.email,
            push = channels.push,
            "Courier initialized successfully."
        );

        Ok(App {
            task_manager,
            local_addr,
            channels,
        })
    }
}
