//! Wire surface: a small axum server exposing the Agent pipeline over HTTP.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent::{Agent, AgentResult};
use crate::schema::SheetAffinity;
use crate::webhook::{self, CloudEvent};

pub struct AppState {
    pub agent: Agent,
    pub environment: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/validate", post(validate))
        .route("/diagnostic-questions", get(diagnostic_questions))
        .route("/webhook/generic", post(webhook_generic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct SheetQuery {
    sheet: Option<String>,
}

fn parse_sheet(raw: Option<&str>) -> SheetAffinity {
    match raw {
        Some("퇴직자") | Some("departed") => SheetAffinity::Departed,
        Some("추가") | Some("supplemental") => SheetAffinity::Supplemental,
        _ => SheetAffinity::Active,
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorBody { error: self.1 })).into_response()
    }
}

impl From<crate::error::Error> for ApiError {
    fn from(e: crate::error::Error) -> Self {
        match e {
            crate::error::Error::Input(msg) => ApiError(StatusCode::BAD_REQUEST, msg),
            other => ApiError(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

/// `multipart/form-data`: a `file` part (the workbook bytes), an optional
/// `sheet` part, an optional `diagnostic_answers` part (JSON object), and an
/// optional `aggregates` part (JSON object) used for Layer-2 reconciliation.
async fn validate(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Result<Json<AgentResult>, ApiError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut sheet = SheetAffinity::Active;
    let mut diagnostic_answers: HashMap<String, Value> = HashMap::new();
    let mut aggregates: HashMap<String, Value> = HashMap::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError(StatusCode::BAD_REQUEST, e.to_string()))? {
        match field.name().unwrap_or_default() {
            "file" => {
                let bytes = field.bytes().await.map_err(|e| ApiError(StatusCode::BAD_REQUEST, e.to_string()))?;
                file_bytes = Some(bytes.to_vec());
            }
            "sheet" => {
                let text = field.text().await.unwrap_or_default();
                sheet = parse_sheet(Some(&text));
            }
            "diagnostic_answers" => {
                let text = field.text().await.unwrap_or_default();
                diagnostic_answers = serde_json::from_str(&text).unwrap_or_default();
            }
            "aggregates" => {
                let text = field.text().await.unwrap_or_default();
                aggregates = serde_json::from_str(&text).unwrap_or_default();
            }
            _ => {}
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| ApiError(StatusCode::BAD_REQUEST, "missing 'file' part".to_string()))?;
    let correlation_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(%correlation_id, sheet = ?sheet, "validation requested");

    let cancellation = crate::agent::new_cancellation_token();
    let result = state.agent.run(&file_bytes, sheet, diagnostic_answers, aggregates, &cancellation).await;

    let event = if result.status == crate::agent::AgentStatus::NeedsHuman {
        webhook::approval_required_event(
            &correlation_id,
            result.ask_human_reason.as_deref().unwrap_or("needs_human"),
            &state.environment,
            &correlation_id,
        )
    } else {
        webhook::validation_completed_event(&correlation_id, result.confidence, result.validation.as_ref().map(|v| v.errors.len()).unwrap_or(0), &state.environment, &correlation_id)
    };
    emit_event(&event);

    Ok(Json(result))
}

fn emit_event(event: &CloudEvent) {
    tracing::info!(event_type = %event.event_type, id = %event.id, "emitting webhook event");
}

async fn diagnostic_questions(axum::extract::Query(query): axum::extract::Query<SheetQuery>) -> Json<Value> {
    let _ = query.sheet;
    let questions = crate::agent::roster_questions();
    Json(serde_json::json!({ "total": questions.len(), "questions": questions }))
}

/// Accepts any inbound CloudEvent-shaped payload and acknowledges it; this
/// product is a webhook producer, not a consumer, so this endpoint exists to
/// satisfy integration smoke tests rather than to drive the pipeline.
async fn webhook_generic(Json(body): Json<Value>) -> Json<Value> {
    let event_id = body.get("id").and_then(Value::as_str).unwrap_or_default();
    let event_type = body.get("type").and_then(Value::as_str).unwrap_or_default();
    Json(serde_json::json!({
        "received": true,
        "event_id": event_id,
        "event_type": event_type,
        "processed_at": chrono::Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sheet_defaults_to_active() {
        assert_eq!(parse_sheet(None), SheetAffinity::Active);
        assert_eq!(parse_sheet(Some("퇴직자")), SheetAffinity::Departed);
        assert_eq!(parse_sheet(Some("추가")), SheetAffinity::Supplemental);
    }
}
