//! A client for Firebase Cloud Messaging (HTTP v1 API).
//!
//! Authenticates with a Google service account: a signed JWT assertion is
//! exchanged for a short-lived bearer token, which is cached and refreshed
//! shortly before it expires.

use crate::config::PushConfig;
use crate::core::{MessageId, PushContent};
use crate::error::DeliveryError;
use crate::notification::push::{PushCredentials, PushTransport};
use anyhow::{Context, Result};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, instrument};

/// The OAuth2 scope required to send messages.
pub const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN: Duration = Duration::from_secs(60);
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(ASSERTION_LIFETIME_SECS as u64);

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS as u64
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ProviderError,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

struct AccessToken {
    value: String,
    refresh_at: Instant,
}

impl AccessToken {
    /// The token is renewed `REFRESH_MARGIN` before it expires, or halfway
    /// through its lifetime when that is shorter than twice the margin.
    fn new(value: String, expires_in: u64) -> Self {
        let lifetime = Duration::from_secs(expires_in).min(MAX_TOKEN_LIFETIME);
        let margin = REFRESH_MARGIN.min(lifetime / 2);
        Self {
            value,
            refresh_at: Instant::now() + (lifetime - margin),
        }
    }

    fn is_fresh(&self) -> bool {
        self.refresh_at > Instant::now()
    }
}

/// Sends push messages through FCM on behalf of one Firebase project.
pub struct FcmClient {
    http: Client,
    project_id: String,
    client_email: String,
    signing_key: EncodingKey,
    token_uri: String,
    api_base: String,
    timeout: Duration,
    cached_token: ArcSwapOption<AccessToken>,
    refresh_lock: Mutex<()>,
}

impl FcmClient {
    /// Creates a client from service account credentials.
    ///
    /// Fails if the private key is not an RSA key in PEM form. Escaped `\n`
    /// sequences, as commonly found in environment variables, are unescaped.
    pub fn new(credentials: PushCredentials, config: &PushConfig) -> Result<Self> {
        let pem = credentials.private_key.replace("\\n", "\n");
        let signing_key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .context("push private key is not a valid RSA PEM key")?;
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("failed to build HTTP client for push delivery")?;

        Ok(Self {
            http,
            project_id: credentials.project_id,
            client_email: credentials.client_email,
            signing_key,
            token_uri: config.token_uri.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
            cached_token: ArcSwapOption::const_empty(),
            refresh_lock: Mutex::new(()),
        })
    }

    fn send_url(&self) -> String {
        format!("{}/v1/projects/{}/messages:send", self.api_base, self.project_id)
    }

    fn sign_assertion(&self) -> Result<String, DeliveryError> {
        let iat = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &self.client_email,
            scope: FCM_SCOPE,
            aud: &self.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| DeliveryError::Internal(format!("failed to sign service account assertion: {e}")))
    }

    /// Returns a bearer token, exchanging a fresh assertion when the cached
    /// one is missing or about to expire.
    async fn access_token(&self) -> Result<String, DeliveryError> {
        if let Some(token) = self.fresh_cached_token() {
            return Ok(token);
        }

        // One exchange at a time; concurrent callers reuse its result.
        let _guard = self.refresh_lock.lock().await;
        if let Some(token) = self.fresh_cached_token() {
            return Ok(token);
        }

        debug!("Requesting new FCM access token");
        let assertion = self.sign_assertion()?;
        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "FCM token exchange failed");
            return Err(DeliveryError::Authentication(format!(
                "token exchange failed with status {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::Authentication(format!("malformed token response: {e}")))?;

        self.cached_token.store(Some(Arc::new(AccessToken::new(
            token.access_token.clone(),
            token.expires_in,
        ))));
        Ok(token.access_token)
    }

    fn fresh_cached_token(&self) -> Option<String> {
        self.cached_token
            .load_full()
            .filter(|token| token.is_fresh())
            .map(|token| token.value.clone())
    }

    fn request_error(&self, e: reqwest::Error) -> DeliveryError {
        if e.is_timeout() {
            DeliveryError::Timeout(self.timeout)
        } else {
            DeliveryError::ProviderRejected(format!("request failed: {e}"))
        }
    }
}

/// Builds the HTTP v1 request body for one device.
pub fn message_payload(token: &str, content: &PushContent) -> Value {
    let mut notification = json!({
        "title": content.title,
        "body": content.body,
    });
    if let Some(image) = &content.image {
        notification["image"] = json!(image);
    }
    json!({
        "message": {
            "token": token,
            "notification": notification,
        }
    })
}

/// Condenses an FCM error response into a single detail string.
fn describe_failure(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => match (error.status, error.message) {
            (Some(code), Some(message)) => format!("{code} ({status}): {message}"),
            (Some(code), None) => format!("{code} ({status})"),
            (None, Some(message)) => format!("{status}: {message}"),
            (None, None) => format!("status {status}"),
        },
        Err(_) if body.is_empty() => format!("status {status}"),
        Err(_) => format!("status {status}: {body}"),
    }
}

#[async_trait]
impl PushTransport for FcmClient {
    #[instrument(skip(self, content), fields(project_id = %self.project_id))]
    async fn send(&self, token: &str, content: &PushContent) -> Result<MessageId, DeliveryError> {
        let bearer = self.access_token().await?;
        let response = self
            .http
            .post(self.send_url())
            .bearer_auth(bearer)
            .json(&message_payload(token, content))
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if status.is_success() {
            let sent: SendResponse = response.json().await.map_err(|e| {
                DeliveryError::ProviderRejected(format!("malformed send response: {e}"))
            })?;
            debug!(message_id = %sent.name, "Push notification accepted by FCM");
            return Ok(MessageId(sent.name));
        }

        if status == StatusCode::UNAUTHORIZED {
            // Force a fresh token on the next call.
            self.cached_token.store(None);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = describe_failure(status, &body);
        error!(%status, detail = %detail, "FCM rejected push notification");
        Err(DeliveryError::ProviderRejected(detail))
    }
}
