//! SMTP mail transport (async lettre, STARTTLS relay).
//! Works with any relay that accepts STARTTLS on the configured port.

use async_trait::async_trait;
use lessonbell_core::error::{LessonBellError, Result};
use lessonbell_core::{EmailMessage, Mailer};
use lettre::message::{Mailbox, MultiPart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor};

pub struct SmtpMailer {
    from: Mailbox,
    recipients: Vec<Mailbox>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Parse addresses and prepare the relay. No connection is made here.
    pub fn new(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        from: &str,
        recipients: &[String],
        timeout_secs: u64,
    ) -> Result<Self> {
        let from: Mailbox = from
            .parse()
            .map_err(|e| LessonBellError::Config(format!("Invalid from: {e}")))?;
        let recipients = recipients
            .iter()
            .map(|r| {
                r.parse::<Mailbox>()
                    .map_err(|e| LessonBellError::Config(format!("Invalid recipient '{r}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| LessonBellError::Config(format!("SMTP relay: {e}")))?
            .port(port)
            .timeout(Some(std::time::Duration::from_secs(timeout_secs.max(1))));
        if !username.is_empty() {
            builder = builder.credentials(Credentials::new(username.to_string(), password.to_string()));
        }

        Ok(Self {
            from,
            recipients,
            transport: builder.build(),
        })
    }

    /// Build the outgoing message: plain text, or multipart/alternative when
    /// an HTML body is present.
    pub fn build_message(&self, message: &EmailMessage) -> Result<LettreMessage> {
        let mut builder = LettreMessage::builder()
            .from(self.from.clone())
            .subject(message.subject.clone());
        for to in &self.recipients {
            builder = builder.to(to.clone());
        }

        let built = match &message.html_body {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(
                message.text_body.clone(),
                html.clone(),
            )),
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(message.text_body.clone()),
        };
        built.map_err(|e| LessonBellError::Transport(format!("Build email: {e}")))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let email = self.build_message(message)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| LessonBellError::Transport(format!("SMTP send: {e}")))?;
        tracing::debug!("📤 SMTP sent: {}", message.subject);
        Ok(())
    }
}
