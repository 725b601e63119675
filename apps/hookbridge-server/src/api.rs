//! Trigger management routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use hookbridge_core::{AccessInfo, ProviderId, TriggerId};
use hookbridge_webhook::{webhook_error_response, DeregistrationOutcome, RemoteCleanup};

use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterTriggerRequest {
    pub trigger_id: String,
    pub provider: String,
    pub source: serde_json::Value,
    pub access_info: AccessInfo,
}

#[derive(Debug, Serialize)]
pub struct RegisterTriggerResponse {
    pub trigger_id: String,
    pub key: String,
    pub endpoint_id: String,
    pub external_id: String,
    pub created: bool,
}

/// Deregistration result, including whether the provider-side webhook was removed
#[derive(Debug, Serialize)]
pub struct DeregisterTriggerResponse {
    pub trigger_id: String,
    pub key: String,
    /// `not_needed`, `deleted` or `failed`
    pub remote: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_error: Option<String>,
}

impl From<DeregistrationOutcome> for DeregisterTriggerResponse {
    fn from(outcome: DeregistrationOutcome) -> Self {
        let (remote, remote_error) = match outcome.remote {
            RemoteCleanup::NotNeeded => ("not_needed", None),
            RemoteCleanup::Deleted => ("deleted", None),
            RemoteCleanup::Failed(message) => ("failed", Some(message)),
        };
        Self {
            trigger_id: outcome.trigger_id.to_string(),
            key: outcome.key.to_string(),
            remote,
            remote_error,
        }
    }
}

pub fn create_api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/triggers", post(register_trigger))
        .route("/triggers/:id", delete(deregister_trigger))
        .route("/triggers/:id/display", get(trigger_display))
        .with_state(state)
}

async fn register_trigger(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterTriggerRequest>,
) -> Response {
    let trigger_id = TriggerId::new(request.trigger_id);
    let provider = ProviderId::new(request.provider);

    match state
        .coordinator
        .register_trigger(&trigger_id, &provider, &request.source, &request.access_info)
        .await
    {
        Ok(outcome) => (
            StatusCode::CREATED,
            Json(RegisterTriggerResponse {
                trigger_id: outcome.trigger_id.to_string(),
                key: outcome.key.to_string(),
                endpoint_id: outcome.endpoint_id.to_string(),
                external_id: outcome.external_handle.to_string(),
                created: outcome.created,
            }),
        )
            .into_response(),
        Err(e) => webhook_error_response(&e),
    }
}

async fn deregister_trigger(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.coordinator.deregister_trigger(&TriggerId::new(id)).await {
        Ok(outcome) => Json(DeregisterTriggerResponse::from(outcome)).into_response(),
        Err(e) => webhook_error_response(&e),
    }
}

async fn trigger_display(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.coordinator.display_for_trigger(&TriggerId::new(id)).await {
        Ok(display) => Json(display).into_response(),
        Err(e) => webhook_error_response(&e),
    }
}
