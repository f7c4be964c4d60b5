//! The platform-facing webhook: subscription handshake on GET, signed
//! event deliveries on POST.

use crate::server::AppState;
use crate::signature::verify_hub_signature;
use axum::body::Bytes;
use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Router};
use serde::Deserialize;
use std::sync::Arc;

pub fn router() -> Router {
    Router::new().route("/webhook", get(verify_webhook).post(receive_events))
}

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// Subscription handshake: echo the challenge iff the mode and token match.
#[tracing::instrument(level = "debug", skip_all)]
async fn verify_webhook(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let mode = query.mode.as_deref().map(str::trim).unwrap_or_default();
    let token = query
        .verify_token
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    if mode.eq_ignore_ascii_case("subscribe") && token == state.verify_token() {
        tracing::info!("webhook subscription verified");
        return (StatusCode::OK, query.challenge.unwrap_or_default()).into_response();
    }
    (StatusCode::FORBIDDEN, "verification failed").into_response()
}

/// Wire shape of an event delivery. Everything is defaulted: entries that
/// do not match the expected shape are skipped per-entry, not rejected.
#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    object: String,
    #[serde(default)]
    entry: Vec<WebhookEntry>,
}

#[derive(Debug, Deserialize)]
struct WebhookEntry {
    #[serde(default)]
    messaging: Vec<MessagingEvent>,
}

#[derive(Debug, Default, Deserialize)]
struct MessagingEvent {
    #[serde(default)]
    sender: EventSender,
    #[serde(default)]
    message: Option<EventMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct EventSender {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct EventMessage {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    is_echo: bool,
}

/// Signed event delivery. The body arrives as raw bytes so the signature
/// is computed over exactly what the platform sent.
#[tracing::instrument(level = "info", skip_all)]
async fn receive_events(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !verify_hub_signature(&headers, &body, state.app_secret()) {
        tracing::warn!("rejected delivery with a missing or invalid signature");
        return (StatusCode::UNAUTHORIZED, "invalid x-hub-signature-256").into_response();
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(error) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("invalid webhook payload: {error}"),
            )
                .into_response();
        }
    };

    if payload.object != "instagram" {
        tracing::warn!(object = %payload.object, "unexpected webhook object type");
        return StatusCode::NOT_FOUND.into_response();
    }

    for entry in payload.entry {
        // The platform delivers one messaging event per entry.
        let Some(event) = entry.messaging.into_iter().next() else {
            continue;
        };
        let Some(message) = event.message else {
            continue;
        };
        if message.is_echo {
            continue;
        }
        let Some(text) = message
            .text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
        else {
            continue;
        };
        let sender_id = event.sender.id.trim();
        if sender_id.is_empty() {
            continue;
        }

        if let Err(error) = state.pipeline.handle_message(sender_id, text).await {
            tracing::error!(%error, sender_id, "message handling failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR").into_response();
        }
    }

    (StatusCode::OK, "EVENT_RECEIVED").into_response()
}
