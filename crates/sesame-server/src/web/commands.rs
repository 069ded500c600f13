use crate::dispatch::dispatch;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use sesame_common::models::command::Envelope;
use std::sync::Arc;

fn reply(envelope: Envelope) -> impl IntoResponse {
    let status = StatusCode::from_u16(envelope.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(envelope))
}

/// POST /commands/{subject} -- run one command; the body is its JSON payload
#[tracing::instrument(skip(state, body))]
pub async fn handle_command(
    State(state): State<Arc<AppState>>,
    Path(subject): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    reply(dispatch(&state, &subject, &body).await)
}

/// GET /health -- liveness, same reply as the healthcheck command
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    reply(dispatch(&state, "auth.healthcheck", &[]).await)
}
