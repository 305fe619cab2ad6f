use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::errors::MailError;
use crate::models::{DeliveryStatus, DigestReport};
use crate::services::email_template::{render_html, render_text};

// ==============================================================================
// Mailer boundary
// ==============================================================================

/// A fully rendered message addressed to every recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    pub recipients: Vec<String>,
}

impl OutgoingEmail {
    pub fn from_report(report: &DigestReport, recipients: &[String], test_mode: bool) -> Self {
        Self {
            subject: report.language.subject(report.date, test_mode),
            html_body: render_html(report),
            text_body: render_text(report),
            recipients: recipients.to_vec(),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

// ==============================================================================
// Delivery stage
// ==============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub status: DeliveryStatus,
    pub error: Option<String>,
    pub attempts: u32,
}

/// Hands the digest to the mailer once, with one extra attempt when the first
/// failure is transient. Never returns an error; failures become `Failed`.
pub struct DeliveryStage {
    mailer: Arc<dyn Mailer>,
    timeout: Duration,
}

impl DeliveryStage {
    pub fn new(mailer: Arc<dyn Mailer>, timeout: Duration) -> Self {
        Self { mailer, timeout }
    }

    pub async fn deliver(&self, email: &OutgoingEmail) -> DeliveryOutcome {
        info!(
            "📤 Sending \"{}\" to {} recipient(s)",
            email.subject,
            email.recipients.len()
        );

        let mut attempts = 1;
        let mut result = self.attempt(email).await;

        if let Err(e) = &result {
            if e.is_transient() {
                warn!("Transient delivery failure, retrying once: {}", e);
                attempts += 1;
                result = self.attempt(email).await;
            }
        }

        match result {
            Ok(()) => {
                info!("✅ Digest delivered after {} attempt(s)", attempts);
                DeliveryOutcome {
                    status: DeliveryStatus::Sent,
                    error: None,
                    attempts,
                }
            }
            Err(e) => {
                error!("❌ Digest delivery failed: {}", e);
                DeliveryOutcome {
                    status: DeliveryStatus::Failed,
                    error: Some(e.to_string()),
                    attempts,
                }
            }
        }
    }

    async fn attempt(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        match tokio::time::timeout(self.timeout, self.mailer.send(email)).await {
            Ok(result) => result,
            Err(_) => Err(MailError::Timeout),
        }
    }
}
