//! Error taxonomy for dispatching notifications.
//!
//! `DeliveryError` is per-task: it always ends up as a rejected outcome in a
//! report and never aborts sibling tasks. `DispatchError` is raised only when
//! the request itself is structurally invalid.

use crate::core::Channel;
use std::time::Duration;
use thiserror::Error;

/// A failed delivery attempt on a single task.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("{0} notifications are not configured on this server")]
    ChannelUnavailable(Channel),

    #[error("provider rejected delivery: {0}")]
    ProviderRejected(String),

    #[error("could not reach provider: {0}")]
    Connection(String),

    #[error("provider authentication failed: {0}")]
    Authentication(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("internal delivery failure: {0}")]
    Internal(String),
}

impl DeliveryError {
    /// A stable, machine-readable name for the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::ChannelUnavailable(_) => "channelUnavailable",
            DeliveryError::ProviderRejected(_) => "providerRejected",
            DeliveryError::Connection(_) => "connection",
            DeliveryError::Authentication(_) => "authentication",
            DeliveryError::InvalidAddress(_) => "invalidAddress",
            DeliveryError::InvalidTemplate(_) => "invalidTemplate",
            DeliveryError::Timeout(_) => "timeout",
            DeliveryError::Internal(_) => "internal",
        }
    }

    /// The message shown to API callers. Internal details are never exposed.
    pub fn public_message(&self) -> String {
        match self {
            DeliveryError::Internal(_) => "internal delivery failure".to_string(),
            other => other.to_string(),
        }
    }
}

/// A request that cannot be expanded into delivery tasks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("request names no delivery channel; nothing to do")]
    EmptyRequest,

    #[error("invalid request: {0}")]
    Invalid(String),
}
