//! Notify reviewers that a submission is waiting for them.
//!
//! Delivery is fire-and-forget: a lost message never fails a submission.

use std::time::Duration;

use serde::Serialize;

use crate::config::Telegram;

const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Port for reviewer notifications.
pub trait Notifier: Send + Sync {
    /// Queue `message` for delivery and return immediately.
    fn send_text(&self, message: String);
}

#[derive(Debug, Serialize)]
struct SendMessage {
    chat_id: String,
    text: String,
}

/// Telegram bot posting into a reviewers chat.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    /// Create a new [`TelegramNotifier`].
    pub fn new(config: &Telegram) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let api = config
            .api_url
            .as_deref()
            .unwrap_or(DEFAULT_TELEGRAM_API)
            .trim_end_matches('/');

        Ok(Self {
            client,
            endpoint: format!("{api}/bot{}/sendMessage", config.token),
            chat_id: config.chat_id.clone(),
        })
    }
}

impl Notifier for TelegramNotifier {
    fn send_text(&self, message: String) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no runtime available, notification dropped");
            return;
        };

        let request = self.client.post(&self.endpoint).json(&SendMessage {
            chat_id: self.chat_id.clone(),
            text: message,
        });

        runtime.spawn(async move {
            match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(_) => tracing::debug!("telegram notification delivered"),
                Err(err) => {
                    tracing::warn!(error = %err, "telegram notification not delivered")
                },
            }
        });
    }
}

/// Writes notifications to the log. Used when no bot is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_text(&self, message: String) {
        tracing::info!(%message, "reviewer notification");
    }
}

/// Keeps every message in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingNotifier(std::sync::Mutex<Vec<String>>);

#[cfg(test)]
impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn send_text(&self, message: String) {
        self.0.lock().unwrap().push(message);
    }
}
