//! Reconciliation of the bot webhook registered with the message platform.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::WEBHOOK_PATH;
use crate::health::{CheckKind, CheckResult};

/// Errors talking to the message platform.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Transport failure. The request URL is stripped since it embeds the token.
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    #[error("Bot API rejected the call: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for WebhookError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

/// What the platform reports about the current webhook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WebhookInfo {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub pending_update_count: u64,
    #[serde(default)]
    pub last_error_message: Option<String>,
}

/// The platform side of the webhook.
#[async_trait]
pub trait WebhookRegistry: Send + Sync {
    async fn webhook_info(&self) -> Result<WebhookInfo, WebhookError>;

    async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> Result<(), WebhookError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<Option<T>, WebhookError> {
        if self.ok {
            Ok(self.result)
        } else {
            Err(WebhookError::Rejected(
                self.description.unwrap_or_else(|| "unknown error".into()),
            ))
        }
    }
}

/// Telegram Bot API client.
#[derive(Debug, Clone)]
pub struct TelegramBotApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl TelegramBotApi {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.telegram.org";

    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: Self::DEFAULT_BASE_URL.into(),
            token: token.into(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.base_url.trim_end_matches('/'),
            self.token
        )
    }
}

#[async_trait]
impl WebhookRegistry for TelegramBotApi {
    async fn webhook_info(&self) -> Result<WebhookInfo, WebhookError> {
        let resp: ApiResponse<WebhookInfo> = self
            .client
            .get(self.method_url("getWebhookInfo"))
            .send()
            .await?
            .json()
            .await?;
        Ok(resp.into_result()?.unwrap_or_default())
    }

    async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> Result<(), WebhookError> {
        let mut body = json!({ "url": url });
        if let Some(token) = secret_token.filter(|t| !t.is_empty()) {
            body["secret_token"] = json!(token);
        }
        let resp: ApiResponse<serde_json::Value> = self
            .client
            .post(self.method_url("setWebhook"))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        resp.into_result()?;
        Ok(())
    }
}

/// The three URLs that have to agree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Gateway URL plus the webhook path.
    pub expected_url: String,
    /// `WEBHOOK_URL` the bot was last deployed with.
    pub configured_url: Option<String>,
    /// URL registered with the platform.
    pub registered_url: String,
    pub pending_update_count: u64,
    pub last_error_message: Option<String>,
}

impl WebhookConfig {
    /// Human-readable list of disagreements. Empty when converged.
    #[must_use]
    pub fn mismatches(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.registered_url.is_empty() {
            out.push("no webhook registered".to_string());
        } else if self.registered_url != self.expected_url {
            out.push(format!("registered URL is {}", self.registered_url));
        }
        match self.configured_url.as_deref() {
            Some(url) if url == self.expected_url => {}
            Some(url) => out.push(format!("bot is configured with {url}")),
            None => out.push("bot has no configured webhook URL".to_string()),
        }
        out
    }

    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.mismatches().is_empty()
    }

    /// True when only a redeploy of the bot can fix the configured URL.
    #[must_use]
    pub fn needs_bot_redeploy(&self) -> bool {
        self.configured_url.as_deref() != Some(self.expected_url.as_str())
    }
}

/// Where reconciliation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookState {
    Unknown,
    /// The current webhook could not be read; nothing was changed.
    CheckFailed(String),
    Checked,
    Matches,
    Mismatch,
    Resynced,
    ResyncFailed(String),
}

/// Outcome of one reconciliation.
#[derive(Debug, Clone)]
pub struct WebhookOutcome {
    pub state: WebhookState,
    /// `None` when the platform could not be queried.
    pub config: Option<WebhookConfig>,
    pub error: Option<String>,
}

impl WebhookOutcome {
    /// Report line for the bot service.
    #[must_use]
    pub fn check_result(&self, service: &str) -> CheckResult {
        let kind = CheckKind::Webhook;
        let mut detail = match (&self.state, &self.config) {
            (WebhookState::Matches, Some(c)) => format!("registered at {}", c.expected_url),
            (WebhookState::Resynced, Some(c)) => {
                format!("resynced to {} ({})", c.expected_url, c.mismatches().join("; "))
            }
            (WebhookState::CheckFailed(e), _) => {
                return CheckResult::fail(service, kind, format!("could not read webhook: {e}"))
            }
            (WebhookState::ResyncFailed(e), _) => {
                return CheckResult::fail(service, kind, format!("resync failed: {e}"))
            }
            (state, _) => return CheckResult::fail(service, kind, format!("{state:?}")),
        };
        if let Some(c) = &self.config {
            if c.pending_update_count > 0 {
                detail.push_str(&format!(", {} pending updates", c.pending_update_count));
            }
            if let Some(msg) = &c.last_error_message {
                detail.push_str(&format!(", last error: {msg}"));
            }
            if c.needs_bot_redeploy() {
                detail.push_str(", redeploy the bot to update its WEBHOOK_URL");
            }
        }
        CheckResult::pass(service, kind, detail)
    }
}

/// Expected webhook URL for a gateway base URL.
#[must_use]
pub fn expected_webhook_url(gateway_url: &str) -> String {
    format!("{}{WEBHOOK_PATH}", gateway_url.trim_end_matches('/'))
}

/// Compares the expected, configured and registered webhook URLs and
/// re-registers at most once.
pub struct WebhookReconciler<'a> {
    registry: &'a dyn WebhookRegistry,
    secret_token: Option<String>,
    state: WebhookState,
}

impl<'a> WebhookReconciler<'a> {
    #[must_use]
    pub fn new(registry: &'a dyn WebhookRegistry, secret_token: Option<String>) -> Self {
        Self {
            registry,
            secret_token,
            state: WebhookState::Unknown,
        }
    }

    #[must_use]
    pub fn state(&self) -> &WebhookState {
        &self.state
    }

    /// Check the webhook and resync it when anything disagrees.
    ///
    /// Failures never propagate. A failed read ends in
    /// [`WebhookState::CheckFailed`], a failed resync in
    /// [`WebhookState::ResyncFailed`].
    pub async fn reconcile(
        &mut self,
        gateway_url: &str,
        configured_url: Option<String>,
    ) -> WebhookOutcome {
        let expected_url = expected_webhook_url(gateway_url);

        let info = match self.registry.webhook_info().await {
            Ok(info) => info,
            Err(e) => {
                warn!("Could not read webhook info: {e}");
                self.state = WebhookState::CheckFailed(e.to_string());
                return WebhookOutcome {
                    state: self.state.clone(),
                    config: None,
                    error: Some(e.to_string()),
                };
            }
        };
        self.state = WebhookState::Checked;

        let config = WebhookConfig {
            expected_url,
            configured_url,
            registered_url: info.url,
            pending_update_count: info.pending_update_count,
            last_error_message: info.last_error_message.filter(|m| !m.is_empty()),
        };

        if config.is_converged() {
            self.state = WebhookState::Matches;
            return WebhookOutcome {
                state: self.state.clone(),
                config: Some(config),
                error: None,
            };
        }

        self.state = WebhookState::Mismatch;
        for issue in config.mismatches() {
            info!("Webhook mismatch: {issue}");
        }

        let error = match self
            .registry
            .set_webhook(&config.expected_url, self.secret_token.as_deref())
            .await
        {
            Ok(()) => {
                info!("Webhook set to {}", config.expected_url);
                self.state = WebhookState::Resynced;
                None
            }
            Err(e) => {
                warn!("Webhook resync failed: {e}");
                self.state = WebhookState::ResyncFailed(e.to_string());
                Some(e.to_string())
            }
        };

        WebhookOutcome {
            state: self.state.clone(),
            config: Some(config),
            error,
        }
    }
}
