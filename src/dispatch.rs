//! The dispatch coordinator.
//!
//! Expands a [`NotificationRequest`] into independent delivery tasks, runs
//! them concurrently and collects every outcome into a [`DispatchReport`]
//! ordered by task position, not by completion time.

use crate::core::{
    Delivered, DeliveryOutcome, DeliveryTask, DispatchReport, EmailSender, EmailTask,
    NotificationRequest, PushContent, PushSender, PushTask, ReportEntry,
};
use crate::error::{DeliveryError, DispatchError};
use crate::report::log_outcome;
use futures::future::join_all;
use reqwest::Url;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinError;
use tracing::{debug, error, instrument};

/// Title of the notification sent by [`Dispatcher::probe_push`].
pub const PROBE_TITLE: &str = "Test Notification";
/// Body of the notification sent by [`Dispatcher::probe_push`].
pub const PROBE_BODY: &str = "This is a test push notification";

/// Fans notification requests out to the channel adapters.
#[derive(Clone)]
pub struct Dispatcher {
    email: Arc<dyn EmailSender>,
    push: Arc<dyn PushSender>,
    allow_empty_requests: bool,
}

impl Dispatcher {
    pub fn new(email: Arc<dyn EmailSender>, push: Arc<dyn PushSender>) -> Self {
        Self {
            email,
            push,
            allow_empty_requests: false,
        }
    }

    /// Accept requests that name no channel and answer them with an empty
    /// report instead of [`DispatchError::EmptyRequest`].
    pub fn allow_empty_requests(mut self, allow: bool) -> Self {
        self.allow_empty_requests = allow;
        self
    }

    /// Validates `request` and turns it into the ordered task list: the email
    /// task first, then one push task per device token in request order.
    pub fn expand(&self, request: NotificationRequest) -> Result<Vec<DeliveryTask>, DispatchError> {
        if request.is_empty() && !self.allow_empty_requests {
            return Err(DispatchError::EmptyRequest);
        }

        let mut tasks = Vec::new();

        if let Some(email) = request.email {
            validate_email(&email)?;
            tasks.push(DeliveryTask::Email(Arc::new(email)));
        }

        if let Some(PushTask {
            content,
            device_tokens,
        }) = request.push
        {
            validate_push(&content, &device_tokens)?;
            let content = Arc::new(content);
            tasks.extend(device_tokens.into_iter().map(|token| DeliveryTask::Push {
                token,
                content: content.clone(),
            }));
        }

        Ok(tasks)
    }

    /// Delivers every task named by `request` and reports all outcomes.
    ///
    /// Fails only when the request itself is invalid, in which case no
    /// adapter is called. Delivery failures end up as rejected entries.
    #[instrument(skip_all)]
    pub async fn dispatch(&self, request: NotificationRequest) -> Result<DispatchReport, DispatchError> {
        let tasks = self.expand(request)?;
        metrics::counter!("notifications_dispatched_total").increment(1);
        debug!(task_count = tasks.len(), "Dispatching delivery tasks");
        Ok(self.run_tasks(tasks).await)
    }

    /// Sends a fixed test notification to a single device.
    #[instrument(skip(self))]
    pub async fn probe_push(&self, token: &str) -> Result<ReportEntry, DispatchError> {
        let request = NotificationRequest {
            email: None,
            push: Some(PushTask {
                content: PushContent {
                    title: PROBE_TITLE.to_string(),
                    body: PROBE_BODY.to_string(),
                    image: None,
                },
                device_tokens: vec![token.to_string()],
            }),
        };
        let tasks = self.expand(request)?;
        let mut entries = self.run_tasks(tasks).await.into_entries();
        entries
            .pop()
            .ok_or_else(|| DispatchError::Invalid("device token must not be empty".to_string()))
    }

    async fn run_tasks(&self, tasks: Vec<DeliveryTask>) -> DispatchReport {
        let handles: Vec<_> = tasks
            .iter()
            .cloned()
            .map(|task| tokio::spawn(self.deliver(task)))
            .collect();

        // Join every handle; results come back in submission order.
        let results = join_all(handles).await;

        let entries = tasks
            .into_iter()
            .zip(results)
            .enumerate()
            .map(|(index, (task, result))| {
                let outcome = match result {
                    Ok(outcome) => outcome,
                    Err(join_error) => internal_failure(index, &task, join_error),
                };
                log_outcome(index, task.channel(), task.target(), &outcome);
                ReportEntry {
                    index,
                    channel: task.channel(),
                    target: task.target().to_string(),
                    outcome,
                }
            })
            .collect();

        DispatchReport::new(entries)
    }

    /// Builds the future delivering a single task. It owns everything it
    /// touches so it can run on its own tokio task.
    fn deliver(&self, task: DeliveryTask) -> impl std::future::Future<Output = DeliveryOutcome> + Send + 'static {
        let email = self.email.clone();
        let push = self.push.clone();
        async move {
            let started = Instant::now();
            let result = match &task {
                DeliveryTask::Email(email_task) => email.send(email_task).await.map(|()| Delivered::Email),
                DeliveryTask::Push { token, content } => {
                    push.send(token, content).await.map(Delivered::Push)
                }
            };
            metrics::histogram!("delivery_duration_seconds", "channel" => task.channel().as_str())
                .record(started.elapsed().as_secs_f64());
            match result {
                Ok(delivered) => DeliveryOutcome::Fulfilled(delivered),
                Err(e) => DeliveryOutcome::Rejected(e),
            }
        }
    }
}

fn internal_failure(index: usize, task: &DeliveryTask, join_error: JoinError) -> DeliveryOutcome {
    let detail = if join_error.is_panic() {
        let payload = join_error.into_panic();
        payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "task panicked".to_string())
    } else {
        join_error.to_string()
    };
    error!(
        index,
        channel = %task.channel(),
        recipient = task.target(),
        detail = %detail,
        "Delivery task failed unexpectedly"
    );
    DeliveryOutcome::Rejected(DeliveryError::Internal(detail))
}

fn validate_email(email: &EmailTask) -> Result<(), DispatchError> {
    for (field, value) in [
        ("from", &email.from),
        ("to", &email.to),
        ("subject", &email.subject),
    ] {
        if value.trim().is_empty() {
            return Err(DispatchError::Invalid(format!("email {field} must not be empty")));
        }
    }
    Ok(())
}

fn validate_push(content: &PushContent, device_tokens: &[String]) -> Result<(), DispatchError> {
    if device_tokens.iter().any(|token| token.trim().is_empty()) {
        return Err(DispatchError::Invalid("device token must not be empty".to_string()));
    }
    if let Some(image) = &content.image {
        let absolute = Url::parse(image)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !absolute {
            return Err(DispatchError::Invalid(format!(
                "push image must be an absolute http(s) URL, got {image:?}"
            )));
        }
    }
    Ok(())
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("allow_empty_requests", &self.allow_empty_requests)
            .finish_non_exhaustive()
    }
}
