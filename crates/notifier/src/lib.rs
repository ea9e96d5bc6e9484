//! Result notifications for the HTB exam watcher.
//!
//! A run ends with exactly one [`Notification`]: the exam result, a polling
//! timeout, or an error report. [`Notifier`] delivers it through a [`Mailer`]
//! backend (Mailgun in production) at most once and never fails the run:
//! delivery problems are logged and swallowed.

pub mod mailer;
pub mod message;

pub use mailer::{Mailer, MailgunMailer};
pub use message::Notification;

use htb_common::config::MailConfig;

/// What happened to the notification handed to [`Notifier::notify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// No mail backend is configured.
    Skipped,
    Failed(String),
}

/// Best-effort, single-shot notification dispatcher.
pub struct Notifier {
    mailer: Option<Box<dyn Mailer>>,
}

impl Notifier {
    /// Create a notifier from mail settings.
    ///
    /// Missing settings produce a disabled notifier with a warning instead
    /// of an error.
    pub fn from_config(config: &MailConfig) -> Self {
        if !config.is_configured() {
            tracing::warn!("MAILGUN_API_KEY or MAILGUN_DOMAIN missing, email disabled");
            return Self::disabled();
        }

        match MailgunMailer::from_config(config) {
            Ok(mailer) => Self::with_mailer(Box::new(mailer)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to initialize Mailgun client, email disabled");
                Self::disabled()
            }
        }
    }

    pub fn with_mailer(mailer: Box<dyn Mailer>) -> Self {
        Self {
            mailer: Some(mailer),
        }
    }

    pub fn disabled() -> Self {
        Self { mailer: None }
    }

    /// Send the notification. Consumes the notifier, so a run sends at most once.
    pub async fn notify(self, notification: Notification) -> Delivery {
        let Some(mailer) = self.mailer else {
            tracing::info!(subject = %notification.subject, "Email disabled, skipping");
            return Delivery::Skipped;
        };

        match mailer.send(&notification).await {
            Ok(()) => {
                tracing::info!(
                    backend = mailer.name(),
                    subject = %notification.subject,
                    "Notification sent"
                );
                Delivery::Sent
            }
            Err(e) => {
                tracing::error!(
                    backend = mailer.name(),
                    error = %e,
                    "Failed to send notification"
                );
                Delivery::Failed(e.to_string())
            }
        }
    }
}
