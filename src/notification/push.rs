//! The push channel adapter.
//!
//! Whether push is usable is decided exactly once, at startup, from the
//! configured credentials. A disabled adapter answers every call with
//! `ChannelUnavailable` and never touches the network.

use crate::config::PushConfig;
use crate::core::{Channel, MessageId, ProviderState, PushContent, PushSender};
use crate::error::DeliveryError;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// A backend that delivers one push message to one device.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, token: &str, content: &PushContent) -> Result<MessageId, DeliveryError>;
}

/// The service account credentials a push backend authenticates with.
#[derive(Clone, PartialEq, Eq)]
pub struct PushCredentials {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
}

impl PushCredentials {
    /// Returns credentials only when all three fields are present and
    /// non-blank.
    pub fn from_config(config: &PushConfig) -> Option<Self> {
        fn present(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }

        Some(Self {
            project_id: present(&config.project_id)?,
            client_email: present(&config.client_email)?,
            private_key: present(&config.private_key)?,
        })
    }
}

impl fmt::Debug for PushCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushCredentials")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"***")
            .finish()
    }
}

/// The push provider adapter.
pub struct PushAdapter {
    state: ProviderState<Arc<dyn PushTransport>>,
    timeout: Duration,
}

impl PushAdapter {
    pub fn new(state: ProviderState<Arc<dyn PushTransport>>, timeout: Duration) -> Self {
        Self { state, timeout }
    }

    /// Decides the adapter state from `credentials`.
    ///
    /// `connect` is only invoked when credentials are complete; its failure
    /// (for example an unparsable private key) fails startup.
    pub fn from_credentials<F>(
        credentials: Option<PushCredentials>,
        timeout: Duration,
        connect: F,
    ) -> Result<Self>
    where
        F: FnOnce(PushCredentials) -> Result<Arc<dyn PushTransport>>,
    {
        let state = match credentials {
            Some(credentials) => {
                let project_id = credentials.project_id.clone();
                let transport = connect(credentials)?;
                info!(%project_id, "Push notifications enabled.");
                ProviderState::Ready(transport)
            }
            None => {
                warn!("Push credentials not set; push notifications are disabled.");
                ProviderState::Disabled
            }
        };
        Ok(Self::new(state, timeout))
    }
}

#[async_trait]
impl PushSender for PushAdapter {
    #[instrument(skip(self, content))]
    async fn send(&self, token: &str, content: &PushContent) -> Result<MessageId, DeliveryError> {
        let Some(transport) = self.state.client() else {
            return Err(DeliveryError::ChannelUnavailable(Channel::Push));
        };

        match tokio::time::timeout(self.timeout, transport.send(token, content)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(self.timeout)),
        }
    }

    fn is_configured(&self) -> bool {
        self.state.is_ready()
    }
}
