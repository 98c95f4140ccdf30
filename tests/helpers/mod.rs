#![allow(dead_code)]
//! Shared fixtures for integration tests.

pub mod app;
pub mod mock_push;
pub mod mock_senders;

use courier::core::{EmailTask, NotificationRequest, PushContent, PushTask};

/// A service account key usable for signing test assertions.
pub const TEST_PRIVATE_KEY: &str = include_str!("../fixtures/service_account_key.pem");

pub fn email_task() -> EmailTask {
    EmailTask {
        from: "noreply@example.com".into(),
        to: "user@example.com".into(),
        subject: "Welcome".into(),
        text: Some("Hello there".into()),
        ..Default::default()
    }
}

pub fn push_task(tokens: &[&str]) -> PushTask {
    PushTask {
        content: PushContent {
            title: "T".into(),
            body: "M".into(),
            image: None,
        },
        device_tokens: tokens.iter().map(|t| t.to_string()).collect(),
    }
}

pub fn request(email: Option<EmailTask>, push: Option<PushTask>) -> NotificationRequest {
    NotificationRequest { email, push }
}
