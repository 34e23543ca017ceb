use async_trait::async_trait;
use tracing::info;

use crate::error::NodeError;

/// A rendered notification ready for transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Mail transport boundary. SMTP wiring is an external collaborator; the
/// engine only needs `send`.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), NodeError>;
}

/// Default transport: logs the mail instead of sending it. Deployments
/// inject their own SMTP-backed implementation.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), NodeError> {
        info!(
            to = mail.to.join(", "),
            subject = %mail.subject,
            "workflow notification (log-only mailer)"
        );
        Ok(())
    }
}
