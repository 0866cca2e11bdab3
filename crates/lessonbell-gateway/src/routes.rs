//! API route handlers for the gateway.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
};
use std::sync::Arc;

use lessonbell_core::{LessonBellError, LessonFields};
use lessonbell_scheduler::trigger;

use super::server::AppState;

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "lessonbell-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Decode the request body leniently. Anything that is not a JSON object of
/// lesson fields counts as an empty payload.
pub fn parse_payload(body: &[u8]) -> LessonFields {
    match serde_json::from_slice::<LessonFields>(body) {
        Ok(fields) => fields,
        Err(e) => {
            tracing::debug!("Unreadable trigger body treated as empty: {e}");
            LessonFields::default()
        }
    }
}

/// POST /api/notify-timeline-change — email everyone that a lesson's
/// Timeline changed. Does not touch the record store.
pub async fn notify_timeline_change(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let payload = parse_payload(&body);
    tracing::info!(
        "📥 Timeline change received: customer={:?} timeline={:?}",
        payload.customer(),
        payload.timeline()
    );

    match trigger::handle_change(&payload, state.mailer.as_ref()).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true })),
        ),
        Err(LessonBellError::Validation(msg)) => {
            tracing::warn!("Timeline change rejected: {msg}");
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": msg })),
            )
        }
        Err(e) => {
            tracing::error!("❌ Timeline change email failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Failed to send email" })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payload_fields() {
        let fields = parse_payload(br#"{"Customer": "Acme", "Timeline": "2024-03-10", "Extra": 1}"#);
        assert_eq!(fields.customer(), Some("Acme"));
        assert_eq!(fields.timeline(), Some("2024-03-10"));
    }

    #[test]
    fn test_parse_payload_garbage_is_empty() {
        for body in [&b"not json"[..], b"", b"[1,2]", b"null"] {
            let fields = parse_payload(body);
            assert!(fields.customer().is_none());
            assert!(fields.timeline().is_none());
        }
    }
}
