//! Webhook HTTP surface for the WhatsApp Cloud API.
//!
//! - `GET /`: liveness text
//! - `GET /webhook`: subscription handshake (`hub.*` query params)
//! - `POST /webhook`: message notifications, run through the pipeline

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::pipeline::processor::FoodPipeline;
use crate::pipeline::types::{InboundEvent, MediaRef, MessageKind};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<FoodPipeline>,
    pub verify_token: SecretString,
}

/// Build the router.
pub fn webhook_routes(pipeline: Arc<FoodPipeline>, verify_token: SecretString) -> Router {
    let state = AppState {
        pipeline,
        verify_token,
    };

    Router::new()
        .route("/", get(liveness))
        .route("/webhook", get(verify).post(receive))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Liveness ────────────────────────────────────────────────────────────

async fn liveness() -> &'static str {
    "food-lens - online"
}

// ── Verification handshake ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

async fn verify(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    let (Some(mode), Some(token)) = (params.mode.as_deref(), params.verify_token.as_deref()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    if mode == "subscribe" && token == state.verify_token.expose_secret() {
        info!("Webhook verified");
        (StatusCode::OK, params.challenge.unwrap_or_default()).into_response()
    } else {
        warn!(mode = %mode, "Webhook verification rejected");
        StatusCode::FORBIDDEN.into_response()
    }
}

// ── Notifications ───────────────────────────────────────────────────────

/// Top-level notification body. Every level is optional on the wire.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub value: WebhookValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookValue {
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
}

/// Fields default so one malformed message cannot reject its whole delivery.
#[derive(Debug, Deserialize)]
pub struct WebhookMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub image: Option<WebhookMedia>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookMedia {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl WebhookPayload {
    /// All messages in delivery order. Status-only callbacks yield none.
    ///
    /// Messages without a sender cannot be answered and are skipped.
    pub fn into_events(self) -> Vec<InboundEvent> {
        self.entry
            .into_iter()
            .flat_map(|entry| entry.changes)
            .flat_map(|change| change.value.messages)
            .filter(|message| {
                let answerable = !message.from.trim().is_empty();
                if !answerable {
                    warn!(message_id = %message.id, "Skipping webhook message without sender");
                }
                answerable
            })
            .map(WebhookMessage::into_event)
            .collect()
    }
}

impl WebhookMessage {
    fn into_event(self) -> InboundEvent {
        let kind = MessageKind::from(self.kind.as_str());
        let media = match kind {
            MessageKind::Image => self
                .image
                .filter(|m| !m.id.is_empty())
                .map(|m| MediaRef {
                    id: m.id,
                    mime_type: m.mime_type,
                }),
            _ => None,
        };
        InboundEvent {
            id: self.id,
            from: self.from,
            kind,
            media,
            received_at: chrono::Utc::now(),
        }
    }
}

/// Runs every message before answering. Any abandoned run → 500.
async fn receive(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> impl IntoResponse {
    let events = payload.into_events();
    if events.is_empty() {
        debug!("Webhook notification without messages");
        return StatusCode::OK;
    }

    let mut failed = 0usize;
    for event in events {
        if state.pipeline.handle(event).await.is_err() {
            failed += 1;
        }
    }

    if failed == 0 {
        StatusCode::OK
    } else {
        warn!(failed, "Webhook delivery had failed runs");
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
