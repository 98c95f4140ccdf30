//! Core domain types and service traits for Courier
//!
//! This module defines the notification request model, the delivery tasks a
//! request expands into, the per-task outcomes, and the trait contracts the
//! dispatch coordinator uses to reach each delivery channel.

use crate::error::DeliveryError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// A notification delivery mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Push,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Push => "push",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Request Model
// =============================================================================

/// A single logical notification naming zero or more delivery channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailTask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<PushTask>,
}

impl NotificationRequest {
    /// Returns `true` when the request names no channel at all.
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.push.is_none()
    }
}

/// An email to a single recipient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailTask {
    pub from: String,
    pub to: String,
    pub subject: String,
    /// Literal plain-text body. Takes precedence over `template_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Template reference, relative to the configured template directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_path: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub template_data: Map<String, Value>,
}

/// The single body resolution path chosen for an email.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EmailBody<'a> {
    Text(&'a str),
    Template {
        path: &'a str,
        data: &'a Map<String, Value>,
    },
}

impl EmailTask {
    /// Picks how the body is produced: literal text wins over a template.
    pub fn body(&self) -> Option<EmailBody<'_>> {
        if let Some(text) = &self.text {
            return Some(EmailBody::Text(text));
        }
        self.template_path.as_deref().map(|path| EmailBody::Template {
            path,
            data: &self.template_data,
        })
    }
}

/// Content shared by every push delivery of a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushContent {
    pub title: String,
    #[serde(rename = "message")]
    pub body: String,
    /// Absolute URL of an image to attach to the notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A push notification addressed to an ordered list of devices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushTask {
    #[serde(flatten)]
    pub content: PushContent,
    #[serde(default)]
    pub device_tokens: Vec<String>,
}

// =============================================================================
// Delivery Model
// =============================================================================

/// One unit of work targeting exactly one recipient on one channel.
#[derive(Debug, Clone)]
pub enum DeliveryTask {
    Email(Arc<EmailTask>),
    Push {
        token: String,
        content: Arc<PushContent>,
    },
}

impl DeliveryTask {
    pub fn channel(&self) -> Channel {
        match self {
            DeliveryTask::Email(_) => Channel::Email,
            DeliveryTask::Push { .. } => Channel::Push,
        }
    }

    /// The recipient address or device token this task delivers to.
    pub fn target(&self) -> &str {
        match self {
            DeliveryTask::Email(task) => &task.to,
            DeliveryTask::Push { token, .. } => token,
        }
    }
}

/// The identifier a push provider assigns to an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The value a successful delivery resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    Email,
    Push(MessageId),
}

/// The terminal state of a single delivery task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Fulfilled(Delivered),
    Rejected(DeliveryError),
}

impl DeliveryOutcome {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, DeliveryOutcome::Fulfilled(_))
    }

    pub fn error(&self) -> Option<&DeliveryError> {
        match self {
            DeliveryOutcome::Rejected(e) => Some(e),
            DeliveryOutcome::Fulfilled(_) => None,
        }
    }
}

/// The outcome of one task, tagged with its position in the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub index: usize,
    pub channel: Channel,
    pub target: String,
    pub outcome: DeliveryOutcome,
}

/// The ordered, complete set of outcomes for a dispatch call.
///
/// Entries are kept in task submission order: the email task first, then one
/// push task per device token in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    entries: Vec<ReportEntry>,
}

impl DispatchReport {
    pub fn new(entries: Vec<ReportEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &DeliveryOutcome> {
        self.entries.iter().map(|entry| &entry.outcome)
    }

    pub fn into_entries(self) -> Vec<ReportEntry> {
        self.entries
    }
}

/// Whether a channel has a usable backend.
///
/// Decided once at startup and never changed afterwards, so it can be shared
/// across concurrent dispatch calls without synchronization.
#[derive(Debug, Clone)]
pub enum ProviderState<C> {
    Ready(C),
    Disabled,
}

impl<C> ProviderState<C> {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProviderState::Ready(_))
    }

    pub fn client(&self) -> Option<&C> {
        match self {
            ProviderState::Ready(client) => Some(client),
            ProviderState::Disabled => None,
        }
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Delivers email messages.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Attempts a single delivery of `task`.
    ///
    /// # Returns
    /// * `Ok(())` once the backend accepted the message
    /// * `Err` with the classified failure otherwise; never retried
    async fn send(&self, task: &EmailTask) -> Result<(), DeliveryError>;

    /// Whether deliveries can reach a backend at all.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Delivers push notifications to individual devices.
#[async_trait]
pub trait PushSender: Send + Sync {
    /// Attempts a single delivery of `content` to the device behind `token`.
    ///
    /// # Returns
    /// * `Ok(MessageId)` assigned by the provider on success
    /// * `Err` with the classified failure otherwise; never retried
    async fn send(&self, token: &str, content: &PushContent) -> Result<MessageId, DeliveryError>;

    /// Whether deliveries can reach a backend at all.
    fn is_configured(&self) -> bool {
        true
    }
}
