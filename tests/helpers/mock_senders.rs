//! Configurable in-memory channel senders.

use async_trait::async_trait;
use courier::core::{EmailSender, EmailTask, MessageId, PushContent, PushSender};
use courier::error::DeliveryError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What a mock sender does when called.
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(DeliveryError),
    Panic,
}

/// An email sender that records every task it receives.
#[derive(Debug)]
pub struct MockEmailSender {
    behavior: Behavior,
    delay: Duration,
    pub calls: AtomicUsize,
    pub received: Mutex<Vec<EmailTask>>,
}

impl MockEmailSender {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Behavior::Succeed)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmailSender for MockEmailSender {
    async fn send(&self, task: &EmailTask) -> Result<(), DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received.lock().unwrap().push(task.clone());
        tokio::time::sleep(self.delay).await;
        match &self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(e) => Err(e.clone()),
            Behavior::Panic => panic!("mock email sender panicked"),
        }
    }
}

/// A push sender whose behavior and latency can be set per device token.
/// Tokens without an explicit behavior succeed with `msg-<token>`.
#[derive(Debug, Default)]
pub struct MockPushSender {
    behaviors: HashMap<String, Behavior>,
    delays: HashMap<String, Duration>,
    unconfigured: bool,
    pub calls: AtomicUsize,
    pub completion_order: Mutex<Vec<String>>,
}

impl MockPushSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(mut self, token: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(token.to_string(), behavior);
        self
    }

    pub fn with_delay(mut self, token: &str, delay: Duration) -> Self {
        self.delays.insert(token.to_string(), delay);
        self
    }

    /// Reports the channel as having no backend.
    pub fn unconfigured(mut self) -> Self {
        self.unconfigured = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushSender for MockPushSender {
    async fn send(&self, token: &str, _content: &PushContent) -> Result<MessageId, DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(token) {
            tokio::time::sleep(*delay).await;
        }
        self.completion_order.lock().unwrap().push(token.to_string());
        match self.behaviors.get(token).unwrap_or(&Behavior::Succeed) {
            Behavior::Succeed => Ok(MessageId(format!("msg-{token}"))),
            Behavior::Fail(e) => Err(e.clone()),
            Behavior::Panic => panic!("mock push sender panicked for {token}"),
        }
    }

    fn is_configured(&self) -> bool {
        !self.unconfigured
    }
}
