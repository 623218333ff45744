//! Send emails to users.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Mail templates list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "template")]
pub enum Template {
    /// One-time code proving the user owns the address.
    EmailCode { code: u32 },
}

impl Template {
    pub fn name(&self) -> &'static str {
        match self {
            Template::EmailCode { .. } => "email_code",
        }
    }
}

/// Port for outgoing emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send `template` to `to`.
    async fn send(&self, to: &str, template: Template) -> Result<()>;
}

/// Writes emails to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, template: Template) -> Result<()> {
        tracing::info!(%to, template = template.name(), "no mail transport, email not sent");
        tracing::debug!(%to, ?template, "email content");
        Ok(())
    }
}

/// Keeps every email in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingMailer(std::sync::Mutex<Vec<(String, Template)>>);

#[cfg(test)]
impl RecordingMailer {
    pub fn sent(&self) -> Vec<(String, Template)> {
        self.0.lock().unwrap().clone()
    }

    /// Code of the last email sent to `to`.
    pub fn last_code(&self, to: &str) -> Option<u32> {
        self.sent()
            .into_iter()
            .rev()
            .find(|(address, _)| address == to)
            .map(|(_, Template::EmailCode { code })| code)
    }
}

#[cfg(test)]
#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, template: Template) -> Result<()> {
        self.0.lock().unwrap().push((to.to_owned(), template));
        Ok(())
    }
}
