//! SendGrid v3 mail transport.
//! One API call per message; every configured recipient is on the same message.

use async_trait::async_trait;
use lessonbell_core::error::{LessonBellError, Result};
use lessonbell_core::{EmailMessage, Mailer};

pub const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

pub struct SendGridMailer {
    api_key: String,
    from: String,
    recipients: Vec<String>,
    endpoint: String,
    timeout: std::time::Duration,
    client: reqwest::Client,
}

impl SendGridMailer {
    pub fn new(api_key: &str, from: &str, recipients: &[String], timeout_secs: u64) -> Self {
        Self {
            api_key: api_key.to_string(),
            from: from.to_string(),
            recipients: recipients.to_vec(),
            endpoint: SENDGRID_ENDPOINT.to_string(),
            timeout: std::time::Duration::from_secs(timeout_secs.max(1)),
            client: reqwest::Client::new(),
        }
    }

    /// Point at a different API host (sandbox, proxy, tests).
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Request body for `message`.
    pub fn payload(&self, message: &EmailMessage) -> serde_json::Value {
        let to: Vec<serde_json::Value> = self
            .recipients
            .iter()
            .map(|r| serde_json::json!({ "email": r }))
            .collect();

        let mut content = vec![serde_json::json!({
            "type": "text/plain",
            "value": message.text_body,
        })];
        if let Some(html) = &message.html_body {
            content.push(serde_json::json!({ "type": "text/html", "value": html }));
        }

        serde_json::json!({
            "personalizations": [{ "to": to }],
            "from": { "email": self.from },
            "subject": message.subject,
            "content": content,
        })
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    fn name(&self) -> &str {
        "sendgrid"
    }

    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(message))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| LessonBellError::Transport(format!("SendGrid send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::debug!("SendGrid accepted: {}", message.subject);
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(LessonBellError::Transport(format!(
                "SendGrid API error {status}: {body}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::HeaderMap, http::StatusCode, routing::post};
    use std::sync::{Arc, Mutex};

    fn message(html: bool) -> EmailMessage {
        EmailMessage {
            subject: "Acme, Late delivery".into(),
            text_body: "Customer: Acme".into(),
            html_body: html.then(|| "<b>Acme</b>".to_string()),
        }
    }

    fn mailer() -> SendGridMailer {
        SendGridMailer::new(
            "SG.key",
            "bot@example.com",
            &["a@example.com".to_string(), "b@example.com".to_string()],
            5,
        )
    }

    #[test]
    fn test_payload_shape() {
        let body = mailer().payload(&message(true));
        assert_eq!(body["from"]["email"], "bot@example.com");
        assert_eq!(body["subject"], "Acme, Late delivery");
        let to = body["personalizations"][0]["to"].as_array().unwrap();
        assert_eq!(to.len(), 2);
        assert_eq!(to[1]["email"], "b@example.com");
        assert_eq!(body["content"][0]["type"], "text/plain");
        assert_eq!(body["content"][1]["type"], "text/html");
    }

    #[test]
    fn test_payload_without_html() {
        let body = mailer().payload(&message(false));
        assert_eq!(body["content"].as_array().unwrap().len(), 1);
    }

    /// Local stand-in for the SendGrid API answering with `status`.
    async fn fake_api(status: StatusCode) -> (String, Arc<Mutex<Vec<(String, serde_json::Value)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = seen.clone();
        let app = Router::new().route(
            "/v3/mail/send",
            post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
                let seen = seen_in.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    seen.lock().unwrap().push((auth, body));
                    status
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        (format!("http://{addr}/v3/mail/send"), seen)
    }

    #[tokio::test]
    async fn test_send_accepted() {
        let (url, seen) = fake_api(StatusCode::ACCEPTED).await;
        mailer().with_endpoint(&url).send(&message(true)).await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "Bearer SG.key");
        assert_eq!(seen[0].1["subject"], "Acme, Late delivery");
    }

    #[tokio::test]
    async fn test_send_rejected_is_transport_error() {
        let (url, _seen) = fake_api(StatusCode::UNAUTHORIZED).await;
        let err = mailer().with_endpoint(&url).send(&message(false)).await.unwrap_err();
        assert!(matches!(err, LessonBellError::Transport(ref m) if m.contains("401")));
    }

    #[tokio::test]
    async fn test_unreachable_is_transport_error() {
        let err = mailer()
            .with_endpoint("http://127.0.0.1:9/v3/mail/send")
            .send(&message(false))
            .await
            .unwrap_err();
        assert!(matches!(err, LessonBellError::Transport(_)));
    }
}
