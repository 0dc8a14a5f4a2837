//! Webhook adapter: Events API endpoint and interactive-message endpoint.
//!
//! Each endpoint is served by its own router (and port) alongside a plain-text liveness route.

use super::events::{AttachmentActionCallback, CallbackEvent, EventsApiEnvelope};
use super::ingest::Ingestor;
use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::Value;

pub const EVENTS_HEALTH_PATH: &str = "/event_health";
pub const INTERACTIVE_HEALTH_PATH: &str = "/";

const INTERACTIVE_ACK: &str = "Rodger that!";
const INVALID_TOKEN_BODY: &str =
    "Sorry, but I didn't recognize your verification token! Perhaps check if it's a valid token.";
const CALLBACK_DECODE_BODY: &str =
    "Oops! Looks like I failed to decode some JSON in the backend. Please contact admins for more info!";
const EVENTS_ERROR_BODY: &str = "Oops! There was an error with the Slack events API";

#[derive(Clone)]
pub struct WebhookState {
    pub ingestor: Ingestor,
    /// Shared secret Slack sends with every push.
    pub verification_token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("could not decode events api envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("could not decode interactive callback: {0}")]
    Callback(#[source] serde_json::Error),
    #[error("verification token mismatch")]
    InvalidToken,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        log::error!("slack webhook: {}", self);
        let (status, body) = match self {
            Self::Envelope(_) => (StatusCode::INTERNAL_SERVER_ERROR, EVENTS_ERROR_BODY),
            Self::Callback(_) => (StatusCode::INTERNAL_SERVER_ERROR, CALLBACK_DECODE_BODY),
            Self::InvalidToken => (StatusCode::UNAUTHORIZED, INVALID_TOKEN_BODY),
        };
        (status, body).into_response()
    }
}

/// `GET /event_health` and `POST <callback_path>`.
pub fn events_router(state: WebhookState, callback_path: &str) -> Router {
    Router::new()
        .route(EVENTS_HEALTH_PATH, get(health))
        .route(callback_path, post(events_callback).fallback(wrong_method))
        .with_state(state)
}

/// `GET /` and `POST <callback_path>`.
pub fn interactive_router(state: WebhookState, callback_path: &str) -> Router {
    Router::new()
        .route(INTERACTIVE_HEALTH_PATH, get(health))
        .route(callback_path, post(interactive_callback).fallback(wrong_method))
        .with_state(state)
}

async fn health() -> &'static str {
    log::debug!("slack webhook: health endpoint hit");
    "OK"
}

async fn wrong_method(method: Method) -> (StatusCode, String) {
    log::error!("slack webhook: invalid method {}", method);
    (
        StatusCode::METHOD_NOT_ALLOWED,
        format!("Oops! I encountered an unexpected HTTP request method: {}", method),
    )
}

/// POST <events path>. Callbacks are acknowledged with `{}` before the inner event is handled.
async fn events_callback(
    State(state): State<WebhookState>,
    body: Bytes,
) -> Result<Response, WebhookError> {
    let envelope = serde_json::from_slice::<Value>(&body)
        .and_then(EventsApiEnvelope::from_value)
        .map_err(WebhookError::Envelope)?;

    if let Some(expected) = state.verification_token.as_deref() {
        let token = envelope.token();
        if !token.is_empty() && token != expected {
            return Err(WebhookError::InvalidToken);
        }
    }

    match envelope {
        EventsApiEnvelope::UrlVerification { challenge, .. } => {
            log::debug!("slack webhook: answering url verification challenge");
            Ok((StatusCode::OK, challenge).into_response())
        }
        EventsApiEnvelope::EventCallback { event, .. } => {
            let ingestor = state.ingestor.clone();
            tokio::spawn(async move {
                match CallbackEvent::from_value(event) {
                    Ok(event) => ingestor.handle_callback_event(event).await,
                    Err(e) => log::error!("slack webhook: undecodable inner event: {}", e),
                }
            });
            Ok((StatusCode::OK, "{}").into_response())
        }
        EventsApiEnvelope::Unhandled { kind, .. } => {
            log::debug!("slack webhook: ignoring envelope type '{}'", kind);
            Ok((StatusCode::OK, "{}").into_response())
        }
    }
}

/// POST <interactions path>: a button press on one of the bot's attachments.
async fn interactive_callback(
    State(state): State<WebhookState>,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let contents = sanitize_contents(&body);
    let callback = AttachmentActionCallback::decode(&contents).map_err(WebhookError::Callback)?;
    if callback.token != state.verification_token.as_deref().unwrap_or_default() {
        return Err(WebhookError::InvalidToken);
    }
    state.ingestor.handle_interactive(&callback);
    log::debug!(
        "slack webhook: interactive callback {} from {}",
        callback.callback_id,
        callback.user.id
    );
    Ok((StatusCode::OK, INTERACTIVE_ACK))
}

/// Extract the JSON from a form-encoded `payload=` body and undo Slack's doubled quote escaping.
pub fn sanitize_contents(body: &[u8]) -> String {
    let payload = url::form_urlencoded::parse(body)
        .find(|(key, _)| key == "payload")
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
    payload.replace("\\\\\"", "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_decodes_payload_field() {
        let body = b"payload=%7B%22token%22%3A%22vt%22%2C%22message_ts%22%3A%221.2%22%7D";
        assert_eq!(
            sanitize_contents(body),
            r#"{"token":"vt","message_ts":"1.2"}"#
        );
    }

    #[test]
    fn sanitize_fixes_double_escaped_quotes() {
        let raw = br#"{"text":"say \\"hi\\""}"#;
        assert_eq!(sanitize_contents(raw), r#"{"text":"say \"hi\""}"#);
    }

    #[test]
    fn sanitize_passes_plain_json_through() {
        let raw = br#"{"token":"vt"}"#;
        let decoded = AttachmentActionCallback::decode(&sanitize_contents(raw)).unwrap();
        assert_eq!(decoded.token, "vt");
    }

    #[test]
    fn error_statuses() {
        assert_eq!(
            WebhookError::InvalidToken.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        let decode = serde_json::from_str::<Value>("{").unwrap_err();
        assert_eq!(
            WebhookError::Callback(decode).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
