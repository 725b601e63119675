//! Webhook request and event types
//!
//! Defines the records that flow through registration and inbound handling.

use axum::{body::Bytes, http::HeaderMap};
use chrono::{DateTime, Utc};
use hookbridge_core::{AccessInfo, EndpointId, ProviderId, TriggerId, VerificationPolicy};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Parameters for creating a provider-side webhook
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Credential used to call the provider API
    pub access_info: AccessInfo,
    /// Shared HMAC secret the provider signs deliveries with
    pub secret: SecretString,
    /// URL the provider delivers to
    pub callback_url: String,
}

/// Identity of a webhook resource on the provider side
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalWebhookHandle(String);

impl ExternalWebhookHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExternalWebhookHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One HTTP delivery from a provider
#[derive(Debug, Clone)]
pub struct InboundWebhookRequest {
    pub provider: ProviderId,
    /// Header names are lowercase
    pub headers: BTreeMap<String, String>,
    /// Byte-exact body; the signature is computed over this
    pub body: Bytes,
}

impl InboundWebhookRequest {
    pub fn new<K, V>(
        provider: ProviderId,
        headers: impl IntoIterator<Item = (K, V)>,
        body: impl Into<Bytes>,
    ) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            provider,
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
                .collect(),
            body: body.into(),
        }
    }

    /// Build from an HTTP header map. Values that are not visible ASCII are dropped.
    pub fn from_header_map(provider: ProviderId, headers: &HeaderMap, body: Bytes) -> Self {
        let headers = headers
            .iter()
            .filter_map(|(name, value)| match value.to_str() {
                Ok(v) => Some((name.as_str().to_string(), v.to_string())),
                Err(_) => {
                    debug!(header = %name, "Dropping non-ASCII header value");
                    None
                }
            })
            .collect();

        Self {
            provider,
            headers,
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Inputs to [`crate::WebhookIntegration::handle_webhook_request`]
#[derive(Debug, Clone, Copy)]
pub struct HandleWebhookOptions<'a> {
    pub request: &'a InboundWebhookRequest,
    pub secret: Option<&'a SecretString>,
    pub policy: VerificationPolicy,
}

/// Provider-agnostic record of one logical event in a delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedWebhookEvent {
    pub delivery_id: String,
    pub event_type: String,
    /// Untouched request body
    pub payload: Bytes,
    /// Request headers minus the provider's excluded set
    pub context: BTreeMap<String, String>,
}

impl NormalizedWebhookEvent {
    /// Parse the payload as JSON
    pub fn payload_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.payload)
    }
}

/// An event matched to one subscribed trigger
#[derive(Debug, Clone)]
pub struct RoutedEvent {
    pub trigger_id: TriggerId,
    pub provider: ProviderId,
    pub endpoint_id: EndpointId,
    pub event: NormalizedWebhookEvent,
    pub received_at: DateTime<Utc>,
}
