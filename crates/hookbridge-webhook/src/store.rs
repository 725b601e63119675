//! Persistence for webhook registrations and trigger subscriptions

use crate::{events::ExternalWebhookHandle, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hookbridge_core::{AccessInfo, EndpointId, ProviderId, RoutingKey, TriggerId};
use secrecy::SecretString;

/// A provider-side webhook, shared by every trigger at its key
#[derive(Debug, Clone)]
pub struct WebhookRegistration {
    pub endpoint_id: EndpointId,
    pub provider: ProviderId,
    pub key: RoutingKey,
    /// Source the webhook was registered for
    pub source: serde_json::Value,
    /// Credential used to create the webhook, reused to delete it
    pub access_info: AccessInfo,
    /// Verifies deliveries for the lifetime of the webhook
    pub secret: SecretString,
    pub external_handle: ExternalWebhookHandle,
    pub created_at: DateTime<Utc>,
}

/// One trigger subscribed at a routing key
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerSubscription {
    pub trigger_id: TriggerId,
    pub provider: ProviderId,
    pub key: RoutingKey,
    pub endpoint_id: EndpointId,
    pub source: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Registration store trait
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Store a registration, replacing any with the same endpoint id
    async fn save_registration(&self, registration: &WebhookRegistration) -> Result<()>;

    async fn registration(&self, endpoint_id: &EndpointId) -> Result<Option<WebhookRegistration>>;

    async fn registration_for_key(&self, key: &RoutingKey) -> Result<Option<WebhookRegistration>>;

    async fn delete_registration(&self, endpoint_id: &EndpointId) -> Result<()>;

    async fn save_subscription(&self, subscription: &TriggerSubscription) -> Result<()>;

    async fn subscription(&self, trigger_id: &TriggerId) -> Result<Option<TriggerSubscription>>;

    async fn delete_subscription(&self, trigger_id: &TriggerId) -> Result<()>;

    /// All subscriptions at a key
    async fn subscriptions_for_key(&self, key: &RoutingKey) -> Result<Vec<TriggerSubscription>>;

    async fn list_subscriptions(&self) -> Result<Vec<TriggerSubscription>>;
}

/// In-memory registration store
pub struct InMemoryRegistrationStore {
    registrations: DashMap<EndpointId, WebhookRegistration>,
    endpoints_by_key: DashMap<RoutingKey, EndpointId>,
    subscriptions: DashMap<TriggerId, TriggerSubscription>,
}

impl InMemoryRegistrationStore {
    pub fn new() -> Self {
        Self {
            registrations: DashMap::new(),
            endpoints_by_key: DashMap::new(),
            subscriptions: DashMap::new(),
        }
    }
}

impl Default for InMemoryRegistrationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistrationStore for InMemoryRegistrationStore {
    async fn save_registration(&self, registration: &WebhookRegistration) -> Result<()> {
        self.endpoints_by_key
            .insert(registration.key.clone(), registration.endpoint_id);
        self.registrations
            .insert(registration.endpoint_id, registration.clone());
        Ok(())
    }

    async fn registration(&self, endpoint_id: &EndpointId) -> Result<Option<WebhookRegistration>> {
        Ok(self.registrations.get(endpoint_id).map(|r| r.clone()))
    }

    async fn registration_for_key(&self, key: &RoutingKey) -> Result<Option<WebhookRegistration>> {
        let endpoint_id = match self.endpoints_by_key.get(key) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.registrations.get(&endpoint_id).map(|r| r.clone()))
    }

    async fn delete_registration(&self, endpoint_id: &EndpointId) -> Result<()> {
        if let Some((_, registration)) = self.registrations.remove(endpoint_id) {
            self.endpoints_by_key
                .remove_if(&registration.key, |_, id| id == endpoint_id);
        }
        Ok(())
    }

    async fn save_subscription(&self, subscription: &TriggerSubscription) -> Result<()> {
        self.subscriptions
            .insert(subscription.trigger_id.clone(), subscription.clone());
        Ok(())
    }

    async fn subscription(&self, trigger_id: &TriggerId) -> Result<Option<TriggerSubscription>> {
        Ok(self.subscriptions.get(trigger_id).map(|s| s.clone()))
    }

    async fn delete_subscription(&self, trigger_id: &TriggerId) -> Result<()> {
        self.subscriptions.remove(trigger_id);
        Ok(())
    }

    async fn subscriptions_for_key(&self, key: &RoutingKey) -> Result<Vec<TriggerSubscription>> {
        Ok(self
            .subscriptions
            .iter()
            .filter(|s| &s.key == key)
            .map(|s| s.clone())
            .collect())
    }

    async fn list_subscriptions(&self) -> Result<Vec<TriggerSubscription>> {
        Ok(self.subscriptions.iter().map(|s| s.clone()).collect())
    }
}
