//! Inbound webhook HTTP surface
//!
//! Providers deliver to `POST /webhooks/{provider}/{endpoint_id}`. The body is
//! taken as raw bytes so signatures are checked over exactly what was sent.

use crate::{
    dispatcher::InboundDispatcher, events::InboundWebhookRequest, scheduler::RunScheduler,
    WebhookError,
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use hookbridge_core::{EndpointId, ProviderId};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared state for webhook routes
pub struct InboundWebhookState {
    dispatcher: Arc<InboundDispatcher>,
    scheduler: Arc<dyn RunScheduler>,
}

impl InboundWebhookState {
    pub fn new(dispatcher: Arc<InboundDispatcher>, scheduler: Arc<dyn RunScheduler>) -> Self {
        Self {
            dispatcher,
            scheduler,
        }
    }
}

/// Create Axum router for inbound webhooks
pub fn create_webhook_router(state: Arc<InboundWebhookState>) -> Router {
    Router::new()
        .route("/webhooks/:provider/:endpoint_id", post(handle_webhook))
        .with_state(state)
}

/// Handle incoming webhook request
async fn handle_webhook(
    State(state): State<Arc<InboundWebhookState>>,
    Path((provider, endpoint_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let provider = ProviderId::new(provider);

    let endpoint_id: EndpointId = match endpoint_id.parse() {
        Ok(id) => id,
        Err(_) => {
            warn!(provider = %provider, endpoint_id = %endpoint_id, "Malformed endpoint id");
            return error_response(StatusCode::NOT_FOUND, "webhook endpoint not found");
        }
    };

    let request = InboundWebhookRequest::from_header_map(provider.clone(), &headers, body);

    let outcome = match state.dispatcher.dispatch(&endpoint_id, &request).await {
        Ok(outcome) => outcome,
        Err(e) => return webhook_error_response(&e),
    };

    // Once any event is handed off the delivery is accepted; a redelivery
    // would start those runs twice.
    let mut routed = 0;
    let mut failed = 0;
    let mut last_error = None;
    for event in outcome.routed {
        let trigger_id = event.trigger_id.clone();
        match state.scheduler.schedule(event).await {
            Ok(()) => routed += 1,
            Err(e) => {
                error!(
                    provider = %provider,
                    endpoint_id = %endpoint_id,
                    trigger_id = %trigger_id,
                    error = %e,
                    "Failed to hand off routed event"
                );
                failed += 1;
                last_error = Some(e);
            }
        }
    }

    if routed == 0 {
        if let Some(e) = last_error {
            return webhook_error_response(&e);
        }
    }

    info!(
        provider = %provider,
        endpoint_id = %endpoint_id,
        events = outcome.events_received,
        routed,
        failed,
        "Received inbound webhook"
    );

    (
        StatusCode::OK,
        Json(json!({ "accepted": true, "routed": routed, "failed": failed })),
    )
        .into_response()
}

/// Map a [`WebhookError`] to a JSON error response
pub fn webhook_error_response(error: &WebhookError) -> Response {
    error_response(error.status_code(), &error.to_string())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
