//! Side-effect seams used by action nodes: outgoing mail and webhooks.
//! Executors talk to these traits; transports are swapped in tests.

mod mailer;
mod webhook;

pub use mailer::{LogMailer, Mailer, OutgoingMail};
pub use webhook::{HttpWebhookTransport, WebhookTransport};
