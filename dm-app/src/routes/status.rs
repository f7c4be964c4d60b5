//! Operator-facing status updates.
//!
//! `{ "status": "out for lunch" }` updates the text used to personalize
//! replies; the literal values "start"/"stop" toggle auto-reply instead,
//! mirroring the in-conversation commands.

use crate::commands::ControlCommand;
use crate::server::AppState;
use crate::store::SETTING_CURRENT_STATUS;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Json, Router};
use serde::Deserialize;
use std::sync::Arc;

pub fn router() -> Router {
    Router::new().route("/status", post(update_status))
}

#[derive(Debug, Deserialize)]
struct StatusUpdate {
    status: String,
}

#[tracing::instrument(level = "info", skip_all)]
async fn update_status(
    Extension(state): Extension<Arc<AppState>>,
    Json(update): Json<StatusUpdate>,
) -> Response {
    let value = update.status.trim();

    if let Some(command) = ControlCommand::parse(value) {
        if let Err(error) = state.store.set_ai_active(command.activates()).await {
            tracing::error!(%error, "failed to toggle auto-reply");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        tracing::info!(?command, "auto-reply toggled via status update");
        return Json(serde_json::json!({
            "status": "ok",
            "applied": "is_ai_active",
            "value": command.activates(),
        }))
        .into_response();
    }

    if value.is_empty() {
        return (StatusCode::BAD_REQUEST, "status must not be empty").into_response();
    }

    if let Err(error) = state.store.set_setting(SETTING_CURRENT_STATUS, value).await {
        tracing::error!(%error, "failed to update current status");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    tracing::info!(status = %value, "current status updated");
    Json(serde_json::json!({
        "status": "ok",
        "applied": "current_status",
        "value": value,
    }))
    .into_response()
}
