//! The email channel: message construction and SMTP delivery.

use crate::config::{EmailConfig, SmtpSecurity};
use crate::core::{Channel, EmailBody, EmailSender, EmailTask, ProviderState};
use crate::error::DeliveryError;
use crate::notification::template::TemplateStore;
use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// A transport that hands a fully built message to a mail server.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, message: Message) -> Result<(), DeliveryError>;
}

/// Delivers mail through an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    timeout: Duration,
}

impl SmtpMailer {
    /// Builds the SMTP transport for `host` from the email configuration.
    ///
    /// Credentials are only attached when both username and password are set.
    pub fn new(host: &str, config: &EmailConfig) -> Result<Self> {
        let mut builder = match config.security {
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
            SmtpSecurity::Opportunistic => {
                let tls = TlsParameters::new(host.to_string())?;
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                    .tls(Tls::Opportunistic(tls))
            }
            SmtpSecurity::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?,
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host)?,
        };

        builder = builder.port(config.port).timeout(Some(config.timeout()));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn deliver(&self, message: Message) -> Result<(), DeliveryError> {
        match self.transport.send(message).await {
            Ok(response) => {
                debug!(code = %response.code(), "SMTP relay accepted message");
                Ok(())
            }
            Err(e) => Err(classify_smtp_error(&e, self.timeout)),
        }
    }
}

/// Maps an SMTP failure onto the delivery error taxonomy.
fn classify_smtp_error(e: &lettre::transport::smtp::Error, timeout: Duration) -> DeliveryError {
    if e.is_timeout() {
        return DeliveryError::Timeout(timeout);
    }
    match e.status() {
        Some(code) if matches!(code.to_string().as_str(), "530" | "534" | "535") => {
            DeliveryError::Authentication(e.to_string())
        }
        Some(_) if e.is_permanent() => DeliveryError::ProviderRejected(e.to_string()),
        _ => DeliveryError::Connection(e.to_string()),
    }
}

/// The email provider adapter.
///
/// Resolves the body of an [`EmailTask`], builds the MIME message and hands it
/// to the configured transport under a bounded timeout.
pub struct EmailAdapter {
    state: ProviderState<Arc<dyn MailTransport>>,
    templates: TemplateStore,
    timeout: Duration,
}

impl EmailAdapter {
    pub fn new(
        state: ProviderState<Arc<dyn MailTransport>>,
        templates: TemplateStore,
        timeout: Duration,
    ) -> Self {
        Self {
            state,
            templates,
            timeout,
        }
    }

    /// Builds the MIME message for `task` without sending it.
    pub async fn build_message(&self, task: &EmailTask) -> Result<Message, DeliveryError> {
        let from: Mailbox = task
            .from
            .parse()
            .map_err(|e| DeliveryError::InvalidAddress(format!("from {:?}: {e}", task.from)))?;
        let to: Mailbox = task
            .to
            .parse()
            .map_err(|e| DeliveryError::InvalidAddress(format!("to {:?}: {e}", task.to)))?;

        let builder = Message::builder()
            .from(from)
            .to(to)
            .subject(task.subject.clone());

        let message = match task.body() {
            Some(EmailBody::Text(text)) => builder
                .header(ContentType::TEXT_PLAIN)
                .body(text.to_string()),
            Some(EmailBody::Template { path, data }) => {
                let html = self.templates.render(path, data).await?;
                builder.header(ContentType::TEXT_HTML).body(html)
            }
            None => {
                return Err(DeliveryError::InvalidTemplate(
                    "no text or template reference given".to_string(),
                ))
            }
        };

        message.map_err(|e| DeliveryError::InvalidAddress(e.to_string()))
    }
}

#[async_trait]
impl EmailSender for EmailAdapter {
    #[instrument(skip_all, fields(to = %task.to))]
    async fn send(&self, task: &EmailTask) -> Result<(), DeliveryError> {
        let Some(transport) = self.state.client() else {
            return Err(DeliveryError::ChannelUnavailable(Channel::Email));
        };

        let attempt = async {
            let message = self.build_message(task).await?;
            transport.deliver(message).await
        };
        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(self.timeout)),
        }
    }

    fn is_configured(&self) -> bool {
        self.state.is_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Records the formatted messages it is asked to deliver.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn deliver(&self, message: Message) -> Result<(), DeliveryError> {
            let raw = String::from_utf8_lossy(&message.formatted()).into_owned();
            self.sent.lock().unwrap().push(raw);
            Ok(())
        }
    }

    struct HangingTransport;

    #[async_trait]
    impl MailTransport for HangingTransport {
        async fn deliver(&self, _message: Message) -> Result<(), DeliveryError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn adapter(transport: Arc<dyn MailTransport>, templates: TemplateStore) -> EmailAdapter {
        EmailAdapter::new(
            ProviderState::Ready(transport),
            templates,
            Duration::from_secs(5),
        )
    }

    fn text_task() -> EmailTask {
        EmailTask {
            from: "a@x.com".into(),
            to: "b@x.com".into(),
            subject: "hi".into(),
            text: Some("hello".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sends_plain_text_body() {
        let transport = Arc::new(RecordingTransport::default());
        let adapter = adapter(transport.clone(), TemplateStore::new("templates"));

        adapter.send(&text_task()).await.unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("To: b@x.com"));
        assert!(sent[0].contains("Subject: hi"));
        assert!(sent[0].contains("Content-Type: text/plain"));
        assert!(sent[0].contains("hello"));
    }

    #[tokio::test]
    async fn test_renders_template_as_html() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("welcome.html"), "<p>Welcome {{ name }}</p>").unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let adapter = adapter(transport.clone(), TemplateStore::new(dir.path()));

        let task = EmailTask {
            text: None,
            template_path: Some("welcome.html".into()),
            template_data: json!({ "name": "Ada" }).as_object().cloned().unwrap(),
            ..text_task()
        };
        adapter.send(&task).await.unwrap();

        let sent = transport.sent.lock().unwrap();
        assert!(sent[0].contains("Content-Type: text/html"));
        assert!(sent[0].contains("<p>Welcome Ada</p>"));
    }

    #[tokio::test]
    async fn test_malformed_address_is_rejected_before_transport() {
        let transport = Arc::new(RecordingTransport::default());
        let adapter = adapter(transport.clone(), TemplateStore::new("templates"));

        let task = EmailTask {
            to: "not an address".into(),
            ..text_task()
        };
        let result = adapter.send(&task).await;

        assert!(matches!(result, Err(DeliveryError::InvalidAddress(_))));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_body_is_rejected() {
        let adapter = adapter(
            Arc::new(RecordingTransport::default()),
            TemplateStore::new("templates"),
        );
        let task = EmailTask {
            text: None,
            ..text_task()
        };
        assert!(matches!(
            adapter.send(&task).await,
            Err(DeliveryError::InvalidTemplate(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_channel_is_unavailable() {
        let adapter = EmailAdapter::new(
            ProviderState::Disabled,
            TemplateStore::new("templates"),
            Duration::from_secs(5),
        );
        assert!(!adapter.is_configured());
        assert_eq!(
            adapter.send(&text_task()).await,
            Err(DeliveryError::ChannelUnavailable(Channel::Email))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_transport_times_out() {
        let adapter = EmailAdapter::new(
            ProviderState::Ready(Arc::new(HangingTransport)),
            TemplateStore::new("templates"),
            Duration::from_secs(2),
        );
        assert_eq!(
            adapter.send(&text_task()).await,
            Err(DeliveryError::Timeout(Duration::from_secs(2)))
        );
    }

    /// Serves one SMTP session on a local port, answering AUTH and MAIL with
    /// the given replies and everything else with success.
    async fn scripted_smtp_server(auth_reply: &'static str, mail_reply: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            write.write_all(b"220 mx.test ESMTP\r\n").await.unwrap();
            while let Ok(Some(line)) = lines.next_line().await {
                let verb = line
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_ascii_uppercase();
                let reply = match verb.as_str() {
                    "EHLO" => "250-mx.test\r\n250 AUTH PLAIN LOGIN\r\n",
                    "AUTH" => auth_reply,
                    "MAIL" => mail_reply,
                    "QUIT" => "221 bye\r\n",
                    _ => "250 OK\r\n",
                };
                if write.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        });
        port
    }

    fn plain_smtp_config(port: u16, credentials: bool) -> EmailConfig {
        EmailConfig {
            host: Some("127.0.0.1".into()),
            port,
            username: credentials.then(|| "courier".to_string()),
            password: credentials.then(|| "wrong".to_string()),
            security: SmtpSecurity::None,
            timeout_ms: 2_000,
            template_dir: "templates".into(),
        }
    }

    #[tokio::test]
    async fn test_smtp_rejected_credentials_are_authentication_errors() {
        let port = scripted_smtp_server(
            "535 5.7.8 Authentication credentials invalid\r\n",
            "250 OK\r\n",
        )
        .await;
        let mailer = SmtpMailer::new("127.0.0.1", &plain_smtp_config(port, true)).unwrap();
        let adapter = adapter(Arc::new(mailer), TemplateStore::new("templates"));

        let result = adapter.send(&text_task()).await;
        match result {
            Err(DeliveryError::Authentication(detail)) => assert!(detail.contains("535")),
            other => panic!("expected Authentication, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_smtp_permanent_reply_is_provider_rejected() {
        let port = scripted_smtp_server(
            "235 2.7.0 Authentication successful\r\n",
            "550 5.1.0 Sender address rejected\r\n",
        )
        .await;
        let mailer = SmtpMailer::new("127.0.0.1", &plain_smtp_config(port, false)).unwrap();
        let adapter = adapter(Arc::new(mailer), TemplateStore::new("templates"));

        let result = adapter.send(&text_task()).await;
        match result {
            Err(DeliveryError::ProviderRejected(detail)) => assert!(detail.contains("550")),
            other => panic!("expected ProviderRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_smtp_connection_failure_is_classified() {
        // Reserve a port, then free it so nothing is listening there.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = EmailConfig {
            host: Some("127.0.0.1".into()),
            port,
            username: None,
            password: None,
            security: SmtpSecurity::None,
            timeout_ms: 2_000,
            template_dir: "templates".into(),
        };
        let mailer = SmtpMailer::new("127.0.0.1", &config).unwrap();
        let adapter = adapter(Arc::new(mailer), TemplateStore::new("templates"));

        let result = adapter.send(&text_task()).await;
        assert!(
            matches!(
                result,
                Err(DeliveryError::Connection(_)) | Err(DeliveryError::Timeout(_))
            ),
            "unexpected result: {result:?}"
        );
    }
}
