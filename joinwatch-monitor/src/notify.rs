//! Operator notification channel
//!
//! Every report goes to one well-known channel. Send failures are returned to
//! the caller, which decides whether to report or only log them.

use async_trait::async_trait;
use joinwatch_common::config::NotifyConfig;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("joinwatch/", env!("CARGO_PKG_VERSION"));

/// Platform limit on a single message
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Notifier errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Notifier not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Error,
}

/// One message for the operator channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub body: String,
}

impl Notification {
    pub fn info(body: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Info,
            body: body.into(),
        }
    }

    pub fn error(body: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            body: body.into(),
        }
    }

    /// Body with its banner, cut to the platform limit
    pub fn formatted(&self) -> String {
        let prefix = match self.kind {
            NotificationKind::Info => "📱 **JOIN MONITOR**",
            NotificationKind::Error => "🚨 **BOT NOTIFICATION**",
        };
        let text = format!("{}\n\n{}", prefix, self.body);
        if text.chars().count() <= MAX_MESSAGE_CHARS {
            return text;
        }
        let mut cut: String = text.chars().take(MAX_MESSAGE_CHARS - 3).collect();
        cut.push_str("...");
        cut
    }
}

/// Delivers notifications to the operator channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Posts to a chat channel through the bot REST API
pub struct ChannelNotifier {
    http_client: reqwest::Client,
    api_base: String,
    channel_id: u64,
    bot_token: String,
}

impl ChannelNotifier {
    pub fn new(config: &NotifyConfig) -> Result<Self, NotifyError> {
        let bot_token = config
            .bot_token
            .clone()
            .ok_or_else(|| NotifyError::NotConfigured("bot_token is not set".to_string()))?;
        let channel_id = config
            .channel_id
            .ok_or_else(|| NotifyError::NotConfigured("channel_id is not set".to_string()))?;

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| NotifyError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            channel_id,
            bot_token,
        })
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let url = format!("{}/channels/{}/messages", self.api_base, self.channel_id);
        let payload = serde_json::json!({ "content": notification.formatted() });

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bot {}", self.bot_token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(NotifyError::ApiError(status.as_u16(), error_text));
        }

        tracing::info!(channel_id = self.channel_id, "Notification sent");
        Ok(())
    }
}

/// Writes notifications to the log instead of sending them
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        match notification.kind {
            NotificationKind::Info => tracing::info!("[notification]\n{}", notification.formatted()),
            NotificationKind::Error => tracing::warn!("[notification]\n{}", notification.formatted()),
        }
        Ok(())
    }
}
