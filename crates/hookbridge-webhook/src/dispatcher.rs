//! Inbound dispatcher
//!
//! Authenticates and normalizes one delivery, then fans it out to every
//! trigger subscribed at the endpoint's routing key. The key comes from the
//! registration, never from the delivery.

use crate::{
    events::{HandleWebhookOptions, InboundWebhookRequest, RoutedEvent},
    registry::ProviderRegistry,
    routing::RoutingKeyIndex,
    store::RegistrationStore,
    Result,
};
use chrono::Utc;
use hookbridge_core::{EndpointId, VerificationPolicy};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of dispatching one delivery
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    /// Events the adapter produced from the delivery
    pub events_received: usize,
    /// One entry per event per subscribed trigger
    pub routed: Vec<RoutedEvent>,
}

/// Routes inbound deliveries to subscribed triggers
pub struct InboundDispatcher {
    registry: Arc<ProviderRegistry>,
    index: Arc<RoutingKeyIndex>,
    store: Arc<dyn RegistrationStore>,
    policy: VerificationPolicy,
}

impl InboundDispatcher {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        index: Arc<RoutingKeyIndex>,
        store: Arc<dyn RegistrationStore>,
        policy: VerificationPolicy,
    ) -> Self {
        Self {
            registry,
            index,
            store,
            policy,
        }
    }

    pub fn policy(&self) -> VerificationPolicy {
        self.policy
    }

    /// Dispatch a delivery addressed to `endpoint_id`.
    ///
    /// A delivery for an endpoint with no registration (for example one that
    /// arrives after deregistration) is accepted with nothing routed.
    pub async fn dispatch(
        &self,
        endpoint_id: &EndpointId,
        request: &InboundWebhookRequest,
    ) -> Result<DispatchOutcome> {
        let adapter = self.registry.resolve(&request.provider)?;

        let registration = match self.store.registration(endpoint_id).await? {
            Some(r) if r.provider == request.provider => r,
            Some(r) => {
                warn!(
                    endpoint_id = %endpoint_id,
                    route_provider = %request.provider,
                    registered_provider = %r.provider,
                    "Delivery provider does not match endpoint"
                );
                return Ok(DispatchOutcome::default());
            }
            None => {
                info!(
                    provider = %request.provider,
                    endpoint_id = %endpoint_id,
                    "Delivery for unregistered endpoint, nothing to route"
                );
                return Ok(DispatchOutcome::default());
            }
        };

        let events = adapter
            .handle_webhook_request(HandleWebhookOptions {
                request,
                secret: Some(&registration.secret),
                policy: self.policy,
            })
            .map_err(|e| {
                warn!(
                    provider = %request.provider,
                    endpoint_id = %endpoint_id,
                    error = %e,
                    "Rejected webhook delivery"
                );
                e
            })?;

        // Subscriptions are indexed under the stored key.
        let derived = adapter.key_for_source(&registration.source)?;
        if derived != registration.key {
            warn!(
                endpoint_id = %endpoint_id,
                stored_key = %registration.key,
                derived_key = %derived,
                "Stored routing key differs from derived key"
            );
        }

        let triggers = self.index.lookup(&registration.key);
        let received_at = Utc::now();
        let routed: Vec<RoutedEvent> = events
            .iter()
            .flat_map(|event| {
                triggers.iter().map(move |trigger_id| RoutedEvent {
                    trigger_id: trigger_id.clone(),
                    provider: request.provider.clone(),
                    endpoint_id: *endpoint_id,
                    event: event.clone(),
                    received_at,
                })
            })
            .collect();

        debug!(
            provider = %request.provider,
            endpoint_id = %endpoint_id,
            key = %registration.key,
            events = events.len(),
            routed = routed.len(),
            "Dispatched webhook delivery"
        );

        Ok(DispatchOutcome {
            events_received: events.len(),
            routed,
        })
    }
}
