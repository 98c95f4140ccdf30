//! A push transport that counts calls, for exercising the real push adapter.

use async_trait::async_trait;
use courier::core::{MessageId, PushContent};
use courier::error::DeliveryError;
use courier::notification::PushTransport;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct CountingPushTransport {
    pub calls: AtomicUsize,
}

impl CountingPushTransport {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for CountingPushTransport {
    async fn send(&self, token: &str, _content: &PushContent) -> Result<MessageId, DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(MessageId(format!("projects/demo/messages/{token}")))
    }
}
