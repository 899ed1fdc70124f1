//! Mail delivery interface
//!
//! Delivery itself is an external collaborator; the pipeline only
//! depends on this trait. `LogMailer` is the default sink for
//! single-node deployments, `RecordingMailer` backs the tests.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

pub type MailResult<T> = Result<T, MailError>;

#[derive(Debug)]
pub struct MailError(pub String);

impl fmt::Display for MailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mail delivery failed: {}", self.0)
    }
}

impl std::error::Error for MailError {}

#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> MailResult<()>;
}

/// Logs the mail instead of delivering it.
#[derive(Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> MailResult<()> {
        info!(
            "mail to {}: {}\n{}",
            mail.to.join(", "),
            mail.subject,
            mail.text_body
        );
        Ok(())
    }
}

/// Captures every sent mail for assertions.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> MailResult<()> {
        self.sent.lock().await.push(mail);
        Ok(())
    }
}
