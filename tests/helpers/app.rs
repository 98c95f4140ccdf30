//! Test helpers for running the full application instance.

use anyhow::Result;
use courier::{
    app::AppBuilder,
    config::Config,
    core::{EmailSender, PushSender},
    server::ChannelStatus,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle, time::timeout};

/// A running application bound to a random local port.
pub struct TestApp {
    pub addr: SocketAddr,
    pub channels: ChannelStatus,
    pub client: reqwest::Client,
    shutdown_tx: watch::Sender<bool>,
    app_handle: JoinHandle<Result<()>>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Shuts down the application and waits for it to terminate.
    /// Fails if the application does not shut down within the specified timeout.
    pub async fn shutdown(self, timeout_duration: Duration) -> Result<()> {
        self.shutdown_tx.send(true).ok();
        match timeout(timeout_duration, self.app_handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(anyhow::anyhow!("App failed to shut down within the timeout")),
        }
    }
}

/// A builder for creating `TestApp` instances with specific configurations.
pub struct TestAppBuilder {
    pub config: Config,
    email: Option<Arc<dyn EmailSender>>,
    push: Option<Arc<dyn PushSender>>,
    metrics: Option<PrometheusHandle>,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        Self {
            config,
            email: None,
            push: None,
            metrics: None,
        }
    }

    pub fn with_email(mut self, sender: Arc<dyn EmailSender>) -> Self {
        self.email = Some(sender);
        self
    }

    pub fn with_push(mut self, sender: Arc<dyn PushSender>) -> Self {
        self.push = Some(sender);
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub async fn build(self) -> Result<TestApp> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut builder = AppBuilder::new(self.config);
        if let Some(email) = self.email {
            builder = builder.email_sender_override(email);
        }
        if let Some(push) = self.push {
            builder = builder.push_sender_override(push);
        }
        if let Some(handle) = self.metrics {
            builder = builder.metrics_handle_override(handle);
        }

        let app = builder.build(shutdown_rx).await?;
        let addr = app.local_addr();
        let channels = app.channels();
        let app_handle = tokio::spawn(app.run());

        Ok(TestApp {
            addr,
            channels,
            client: reqwest::Client::new(),
            shutdown_tx,
            app_handle,
        })
    }
}
