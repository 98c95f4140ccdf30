//! Provider adapters for each delivery channel.
//!
//! Each channel has an adapter implementing the matching service trait from
//! [`crate::core`], and a transport trait underneath it so the network backend
//! can be swapped out in tests.
pub mod email;
pub mod fcm;
pub mod push;
pub mod template;

pub use email::{EmailAdapter, MailTransport, SmtpMailer};
pub use fcm::FcmClient;
pub use push::{PushAdapter, PushCredentials, PushTransport};
pub use template::TemplateStore;
