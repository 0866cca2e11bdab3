//! # LessonBell Channels
//! Outbound mail transports. Each implements [`Mailer`]; the rest of the
//! system never sees which one is configured.

pub mod email;
pub mod sendgrid;

use std::sync::Arc;

use lessonbell_core::config::{MailConfig, MailTransport};
use lessonbell_core::error::{LessonBellError, Result};
use lessonbell_core::Mailer;

pub use email::SmtpMailer;
pub use sendgrid::SendGridMailer;

/// Build the configured transport, checking the settings it needs.
pub fn build_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    if config.from.trim().is_empty() {
        return Err(LessonBellError::Config("mail sender (MAIL_FROM) is not set".into()));
    }
    if config.recipients.is_empty() {
        return Err(LessonBellError::Config(
            "no recipients configured (NOTIFY_RECIPIENTS)".into(),
        ));
    }

    let mailer: Arc<dyn Mailer> = match config.transport {
        MailTransport::SendGrid => {
            if config.api_key.is_empty() {
                return Err(LessonBellError::Config("SENDGRID_API_KEY is not set".into()));
            }
            Arc::new(SendGridMailer::new(
                &config.api_key,
                &config.from,
                &config.recipients,
                config.timeout_secs,
            ))
        }
        MailTransport::Smtp => {
            if config.smtp_host.is_empty() {
                return Err(LessonBellError::Config("SMTP_HOST is not set".into()));
            }
            Arc::new(SmtpMailer::new(
                &config.smtp_host,
                config.smtp_port,
                &config.smtp_username,
                &config.smtp_password,
                &config.from,
                &config.recipients,
                config.timeout_secs,
            )?)
        }
    };
    tracing::info!(
        "📧 Mail transport: {} → {} recipient(s)",
        mailer.name(),
        config.recipients.len()
    );
    Ok(mailer)
}
