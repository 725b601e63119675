//! The provider adapter contract
//!
//! Every provider implements [`WebhookIntegration`]. Keying and display are
//! pure; registration talks to the provider API; inbound handling
//! authenticates and normalizes one delivery.

use crate::{
    events::{
        ExternalWebhookHandle, HandleWebhookOptions, NormalizedWebhookEvent, WebhookConfig,
    },
    signature::WebhookVerifier,
    Result, WebhookError,
};
use async_trait::async_trait;
use hookbridge_core::{AccessInfo, DisplayProperties, ProviderId, RoutingKey, VerificationPolicy};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Webhook integration implemented once per provider
#[async_trait]
pub trait WebhookIntegration: Send + Sync {
    /// Identifier used in routes and registry lookups
    fn provider_id(&self) -> &ProviderId;

    /// Derive the routing key for a trigger source. Pure and deterministic.
    fn key_for_source(&self, source: &serde_json::Value) -> Result<RoutingKey>;

    /// Create the provider-side webhook for a source. Not idempotent.
    async fn register_webhook(
        &self,
        config: &WebhookConfig,
        source: &serde_json::Value,
    ) -> Result<ExternalWebhookHandle>;

    /// Remove a provider-side webhook. A webhook that is already gone counts as removed.
    async fn unregister_webhook(
        &self,
        access_info: &AccessInfo,
        source: &serde_json::Value,
        handle: &ExternalWebhookHandle,
    ) -> Result<()>;

    /// Authenticate and normalize one delivery.
    fn handle_webhook_request(
        &self,
        options: HandleWebhookOptions<'_>,
    ) -> Result<Vec<NormalizedWebhookEvent>>;

    /// Presentation data for a trigger source
    fn display_properties(&self, source: &serde_json::Value) -> Result<DisplayProperties>;
}

/// Parse a raw source into a provider's typed descriptor.
///
/// `T` is an enum tagged by `subresource`; `known` lists the tags it accepts.
/// An unknown or missing tag is [`WebhookError::UnsupportedSubresource`];
/// a known tag with bad fields is [`WebhookError::InvalidSource`].
pub fn parse_source<T: DeserializeOwned>(
    provider: &ProviderId,
    known: &[&str],
    source: &serde_json::Value,
) -> Result<T> {
    let subresource = source
        .get("subresource")
        .and_then(|v| v.as_str())
        .unwrap_or("<missing>");

    if !known.contains(&subresource) {
        return Err(WebhookError::UnsupportedSubresource {
            provider: provider.to_string(),
            subresource: subresource.to_string(),
        });
    }

    serde_json::from_value(source.clone())
        .map_err(|e| WebhookError::InvalidSource(format!("{provider} {subresource}: {e}")))
}

/// Reject empty or blank event lists before they reach a key or a provider call.
pub fn validate_events(events: &[String]) -> Result<()> {
    if events.is_empty() {
        return Err(WebhookError::InvalidSource("events must not be empty".into()));
    }
    if events.iter().any(|e| e.trim().is_empty()) {
        return Err(WebhookError::InvalidSource("event names must not be blank".into()));
    }
    Ok(())
}

/// Header names a provider uses for a single-event delivery
#[derive(Debug, Clone, Copy)]
pub struct DeliveryHeaders {
    pub delivery_id: &'static str,
    pub event_type: &'static str,
    pub signature: &'static str,
    /// Removed from the event context
    pub excluded: &'static [&'static str],
}

impl DeliveryHeaders {
    /// Verify and normalize a delivery that carries exactly one event.
    pub fn normalize(
        &self,
        provider: &ProviderId,
        options: HandleWebhookOptions<'_>,
    ) -> Result<Vec<NormalizedWebhookEvent>> {
        let request = options.request;

        let delivery_id = request.header(self.delivery_id).ok_or_else(|| {
            WebhookError::InvalidDelivery(format!("missing {} header", self.delivery_id))
        })?;
        let signature = request.header(self.signature);

        match (options.secret, signature) {
            (Some(secret), Some(signature)) => {
                debug!(provider = %provider, delivery_id, "Verifying webhook signature");
                WebhookVerifier::new(secret.expose_secret())
                    .verify(&request.body, signature)
                    .map_err(|e| WebhookError::verification(delivery_id, e.to_string()))?;
            }
            (secret, _) => {
                let reason = if secret.is_none() {
                    "missing secret"
                } else {
                    "missing signature"
                };

                match options.policy {
                    VerificationPolicy::Strict => {
                        return Err(WebhookError::verification(delivery_id, reason));
                    }
                    VerificationPolicy::AllowUnsigned => {
                        warn!(
                            provider = %provider,
                            delivery_id,
                            reason,
                            "Accepting unverified webhook delivery"
                        );
                    }
                }
            }
        }

        let event_type = request.header(self.event_type).ok_or_else(|| {
            WebhookError::InvalidDelivery(format!(
                "missing {} header [delivery_id = {}]",
                self.event_type, delivery_id
            ))
        })?;

        let context = request
            .headers
            .iter()
            .filter(|(name, _)| !self.excluded.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Ok(vec![NormalizedWebhookEvent {
            delivery_id: delivery_id.to_string(),
            event_type: event_type.to_string(),
            payload: request.body.clone(),
            context,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{events::InboundWebhookRequest, signature::WebhookSigner};
    use axum::body::Bytes;
    use secrecy::SecretString;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(tag = "subresource", rename_all = "snake_case")]
    enum TestSource {
        Repository { repo: String },
    }

    const HEADERS: DeliveryHeaders = DeliveryHeaders {
        delivery_id: "x-delivery",
        event_type: "x-event",
        signature: "x-signature",
        excluded: &["x-delivery", "x-event", "x-signature", "content-type"],
    };

    fn provider() -> ProviderId {
        ProviderId::new("test")
    }

    fn request(signature: Option<String>) -> InboundWebhookRequest {
        let mut headers = vec![
            ("x-delivery".to_string(), "d-1".to_string()),
            ("x-event".to_string(), "push".to_string()),
            ("content-type".to_string(), "application/json".to_string()),
            ("user-agent".to_string(), "Test-Hookshot".to_string()),
        ];
        if let Some(sig) = signature {
            headers.push(("x-signature".to_string(), sig));
        }
        InboundWebhookRequest::new(provider(), headers, Bytes::from_static(b"{\"a\":1}"))
    }

    #[test]
    fn test_parse_source_unknown_subresource() {
        let result: Result<TestSource> = parse_source(
            &provider(),
            &["repository"],
            &serde_json::json!({"subresource": "enterprise", "repo": "a/b"}),
        );
        assert!(matches!(
            result,
            Err(WebhookError::UnsupportedSubresource { subresource, .. }) if subresource == "enterprise"
        ));

        let missing: Result<TestSource> =
            parse_source(&provider(), &["repository"], &serde_json::json!({"repo": "a/b"}));
        assert!(matches!(missing, Err(WebhookError::UnsupportedSubresource { .. })));
    }

    #[test]
    fn test_parse_source_bad_fields() {
        let result: Result<TestSource> = parse_source(
            &provider(),
            &["repository"],
            &serde_json::json!({"subresource": "repository", "repo": 7}),
        );
        assert!(matches!(result, Err(WebhookError::InvalidSource(_))));
    }

    #[test]
    fn test_validate_events() {
        assert!(validate_events(&["push".to_string()]).is_ok());
        assert!(validate_events(&[]).is_err());
        assert!(validate_events(&[" ".to_string()]).is_err());
    }

    #[test]
    fn test_normalize_signed_delivery() {
        let secret = SecretString::new("s3cret".to_string());
        let signature = WebhookSigner::new("s3cret").sign(b"{\"a\":1}");
        let request = request(Some(signature));

        let events = HEADERS
            .normalize(
                &provider(),
                HandleWebhookOptions {
                    request: &request,
                    secret: Some(&secret),
                    policy: VerificationPolicy::Strict,
                },
            )
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].delivery_id, "d-1");
        assert_eq!(events[0].event_type, "push");
        assert_eq!(events[0].payload, request.body);
        assert_eq!(events[0].context.len(), 1);
        assert_eq!(events[0].context["user-agent"], "Test-Hookshot");
    }

    #[test]
    fn test_strict_policy_rejects_unsigned() {
        let secret = SecretString::new("s3cret".to_string());
        let request = request(None);

        let result = HEADERS.normalize(
            &provider(),
            HandleWebhookOptions {
                request: &request,
                secret: Some(&secret),
                policy: VerificationPolicy::Strict,
            },
        );

        assert!(matches!(
            result,
            Err(WebhookError::Verification { reason, .. }) if reason == "missing signature"
        ));
    }

    #[test]
    fn test_allow_unsigned_policy_skips_verification() {
        let request = request(Some("sha256=deadbeef".to_string()));

        let events = HEADERS
            .normalize(
                &provider(),
                HandleWebhookOptions {
                    request: &request,
                    secret: None,
                    policy: VerificationPolicy::AllowUnsigned,
                },
            )
            .unwrap();

        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_missing_delivery_header() {
        let request = InboundWebhookRequest::new(
            provider(),
            [("x-event", "push")],
            Bytes::new(),
        );

        let result = HEADERS.normalize(
            &provider(),
            HandleWebhookOptions {
                request: &request,
                secret: None,
                policy: VerificationPolicy::AllowUnsigned,
            },
        );

        assert!(matches!(result, Err(WebhookError::InvalidDelivery(_))));
    }
}
