//! Registration coordinator
//!
//! Creates and removes provider-side webhooks as triggers come and go. One
//! provider-side webhook exists per routing key; every trigger at that key
//! shares it, so a stream is registered once and delivered once.
//!
//! Mutations are serialized per trigger and per key. Lock order is always
//! trigger lock, then key lock. The index lock is never held across a
//! provider call.

use crate::{
    events::{ExternalWebhookHandle, WebhookConfig},
    registry::ProviderRegistry,
    retry::RetryConfig,
    routing::RoutingKeyIndex,
    signature::generate_webhook_secret,
    store::{RegistrationStore, TriggerSubscription, WebhookRegistration},
    Result, WebhookError,
};
use chrono::Utc;
use dashmap::DashMap;
use hookbridge_core::{
    AccessInfo, DisplayProperties, EndpointId, ProviderId, RoutingKey, TriggerId, WebhookSettings,
};
use secrecy::SecretString;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

/// Coordinator settings
#[derive(Debug, Clone)]
pub struct RegistrationSettings {
    /// Public base URL providers deliver to
    pub callback_base_url: String,
    /// Bound on every provider API call
    pub provider_timeout: Duration,
    /// Retry policy for webhook deletion
    pub delete_retry: RetryConfig,
}

impl RegistrationSettings {
    pub fn new(callback_base_url: impl Into<String>) -> Self {
        Self {
            callback_base_url: callback_base_url.into(),
            provider_timeout: Duration::from_secs(10),
            delete_retry: RetryConfig::default(),
        }
    }

    pub fn from_webhook_settings(settings: &WebhookSettings) -> Self {
        Self {
            callback_base_url: settings.callback_base_url.clone(),
            provider_timeout: settings.provider_timeout(),
            delete_retry: RetryConfig::from_settings(settings),
        }
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_delete_retry(mut self, retry: RetryConfig) -> Self {
        self.delete_retry = retry;
        self
    }

    /// Callback URL for one endpoint
    pub fn callback_url(&self, provider: &ProviderId, endpoint_id: &EndpointId) -> String {
        format!(
            "{}/webhooks/{}/{}",
            self.callback_base_url.trim_end_matches('/'),
            provider,
            endpoint_id
        )
    }
}

/// Result of registering a trigger
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub trigger_id: TriggerId,
    pub key: RoutingKey,
    pub endpoint_id: EndpointId,
    pub external_handle: ExternalWebhookHandle,
    /// Whether a provider-side webhook was created for this call
    pub created: bool,
}

/// What happened to the provider-side webhook on deregistration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCleanup {
    /// Other triggers still use the webhook
    NotNeeded,
    Deleted,
    /// Local state was removed; the provider-side webhook may still exist
    Failed(String),
}

/// Result of deregistering a trigger
#[derive(Debug, Clone)]
pub struct DeregistrationOutcome {
    pub trigger_id: TriggerId,
    pub key: RoutingKey,
    pub remote: RemoteCleanup,
}

/// Orchestrates provider-side webhook lifecycles
pub struct RegistrationCoordinator {
    registry: Arc<ProviderRegistry>,
    index: Arc<RoutingKeyIndex>,
    store: Arc<dyn RegistrationStore>,
    settings: RegistrationSettings,
    trigger_locks: KeyedLocks<TriggerId>,
    key_locks: KeyedLocks<RoutingKey>,
}

impl RegistrationCoordinator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        index: Arc<RoutingKeyIndex>,
        store: Arc<dyn RegistrationStore>,
        settings: RegistrationSettings,
    ) -> Self {
        Self {
            registry,
            index,
            store,
            settings,
            trigger_locks: KeyedLocks::new(),
            key_locks: KeyedLocks::new(),
        }
    }

    /// Subscribe a trigger to the stream its source describes.
    ///
    /// Registering a trigger again with a source at the same key is a no-op.
    /// A source at a different key moves the trigger.
    pub async fn register_trigger(
        &self,
        trigger_id: &TriggerId,
        provider: &ProviderId,
        source: &serde_json::Value,
        access_info: &AccessInfo,
    ) -> Result<RegistrationOutcome> {
        let adapter = self.registry.resolve(provider)?;
        let key = adapter.key_for_source(source)?;

        let _trigger_guard = self.trigger_locks.lock(trigger_id).await;

        let previous = self.store.subscription(trigger_id).await?;
        if let Some(existing) = &previous {
            if existing.key == key {
                let registration = self
                    .store
                    .registration(&existing.endpoint_id)
                    .await?
                    .ok_or_else(|| {
                        WebhookError::Storage(format!(
                            "registration {} missing for trigger {}",
                            existing.endpoint_id, trigger_id
                        ))
                    })?;
                debug!(trigger_id = %trigger_id, key = %key, "Trigger already registered");
                return Ok(RegistrationOutcome {
                    trigger_id: trigger_id.clone(),
                    key,
                    endpoint_id: registration.endpoint_id,
                    external_handle: registration.external_handle,
                    created: false,
                });
            }

            info!(
                trigger_id = %trigger_id,
                old_key = %existing.key,
                new_key = %key,
                "Trigger source changed, moving subscription"
            );
        }

        // The old subscription stays live until the new key is fully set up.
        let (registration, created) = {
            let _key_guard = self.key_locks.lock(&key).await;

            let (registration, created) = match self.store.registration_for_key(&key).await? {
                Some(registration) => (registration, false),
                None => {
                    let registration = self
                        .create_registration(provider, &key, source, access_info)
                        .await?;
                    (registration, true)
                }
            };

            let subscription = TriggerSubscription {
                trigger_id: trigger_id.clone(),
                provider: provider.clone(),
                key: key.clone(),
                endpoint_id: registration.endpoint_id,
                source: source.clone(),
                created_at: Utc::now(),
            };
            self.store.save_subscription(&subscription).await?;
            self.index.insert(key.clone(), trigger_id.clone());

            (registration, created)
        };

        if let Some(previous) = previous {
            let remote = self.release_key(&previous).await?;
            debug!(
                trigger_id = %trigger_id,
                old_key = %previous.key,
                remote = ?remote,
                "Left previous key"
            );
        }

        info!(
            trigger_id = %trigger_id,
            provider = %provider,
            key = %key,
            endpoint_id = %registration.endpoint_id,
            created,
            "Trigger registered"
        );

        Ok(RegistrationOutcome {
            trigger_id: trigger_id.clone(),
            key,
            endpoint_id: registration.endpoint_id,
            external_handle: registration.external_handle,
            created,
        })
    }

    /// Remove a trigger's subscription, deleting the provider-side webhook
    /// when it was the last trigger at its key.
    pub async fn deregister_trigger(
        &self,
        trigger_id: &TriggerId,
    ) -> Result<DeregistrationOutcome> {
        let _trigger_guard = self.trigger_locks.lock(trigger_id).await;

        let subscription = self
            .store
            .subscription(trigger_id)
            .await?
            .ok_or_else(|| WebhookError::TriggerNotFound(trigger_id.to_string()))?;

        let remote = self.remove_subscription(&subscription).await?;
        info!(
            trigger_id = %trigger_id,
            key = %subscription.key,
            remote = ?remote,
            "Trigger deregistered"
        );

        Ok(DeregistrationOutcome {
            trigger_id: trigger_id.clone(),
            key: subscription.key,
            remote,
        })
    }

    /// Presentation data for a registered trigger
    pub async fn display_for_trigger(&self, trigger_id: &TriggerId) -> Result<DisplayProperties> {
        let subscription = self
            .store
            .subscription(trigger_id)
            .await?
            .ok_or_else(|| WebhookError::TriggerNotFound(trigger_id.to_string()))?;

        self.registry
            .resolve(&subscription.provider)?
            .display_properties(&subscription.source)
    }

    /// Rebuild the routing index from the store. Returns the number of subscriptions loaded.
    pub async fn restore(&self) -> Result<usize> {
        let subscriptions = self.store.list_subscriptions().await?;
        let count = subscriptions.len();
        self.index.rebuild(subscriptions.into_iter().map(|s| (s.key, s.trigger_id)));

        info!(subscriptions = count, keys = self.index.len(), "Routing index restored");
        Ok(count)
    }

    async fn create_registration(
        &self,
        provider: &ProviderId,
        key: &RoutingKey,
        source: &serde_json::Value,
        access_info: &AccessInfo,
    ) -> Result<WebhookRegistration> {
        let adapter = self.registry.resolve(provider)?;
        let endpoint_id = EndpointId::new();
        let config = WebhookConfig {
            access_info: access_info.clone(),
            secret: SecretString::new(generate_webhook_secret()),
            callback_url: self.settings.callback_url(provider, &endpoint_id),
        };

        // Not retried: a repeated create can leave a duplicate webhook behind.
        let external_handle = self
            .with_timeout("register webhook", adapter.register_webhook(&config, source))
            .await?;

        let registration = WebhookRegistration {
            endpoint_id,
            provider: provider.clone(),
            key: key.clone(),
            source: source.clone(),
            access_info: config.access_info,
            secret: config.secret,
            external_handle,
            created_at: Utc::now(),
        };
        self.store.save_registration(&registration).await?;

        Ok(registration)
    }

    /// Drop a subscription from the store and index, then tear down the
    /// provider-side webhook if nothing else uses it. Caller holds the trigger lock.
    async fn remove_subscription(
        &self,
        subscription: &TriggerSubscription,
    ) -> Result<RemoteCleanup> {
        self.store
            .delete_subscription(&subscription.trigger_id)
            .await?;
        self.release_key(subscription).await
    }

    /// Take the subscription's trigger out of the index at its key. The
    /// stored subscription must already be deleted or point at another key.
    async fn release_key(&self, subscription: &TriggerSubscription) -> Result<RemoteCleanup> {
        let _key_guard = self.key_locks.lock(&subscription.key).await;

        let index_empty = self.index.remove(&subscription.key, &subscription.trigger_id);
        let remaining = self.store.subscriptions_for_key(&subscription.key).await?;
        if !index_empty || !remaining.is_empty() {
            return Ok(RemoteCleanup::NotNeeded);
        }

        let registration = match self.store.registration_for_key(&subscription.key).await? {
            Some(registration) => registration,
            None => {
                warn!(key = %subscription.key, "No registration found for key");
                return Ok(RemoteCleanup::NotNeeded);
            }
        };
        self.store
            .delete_registration(&registration.endpoint_id)
            .await?;

        Ok(self.delete_remote(&registration).await)
    }

    async fn delete_remote(&self, registration: &WebhookRegistration) -> RemoteCleanup {
        let adapter = match self.registry.resolve(&registration.provider) {
            Ok(adapter) => adapter,
            Err(e) => return RemoteCleanup::Failed(e.to_string()),
        };

        let result = self
            .settings
            .delete_retry
            .run("unregister webhook", || {
                self.with_timeout(
                    "unregister webhook",
                    adapter.unregister_webhook(
                        &registration.access_info,
                        &registration.source,
                        &registration.external_handle,
                    ),
                )
            })
            .await;

        match result {
            Ok(()) => RemoteCleanup::Deleted,
            Err(e) => {
                error!(
                    provider = %registration.provider,
                    endpoint_id = %registration.endpoint_id,
                    external_id = %registration.external_handle,
                    error = %e,
                    "Failed to delete provider webhook"
                );
                RemoteCleanup::Failed(e.to_string())
            }
        }
    }

    async fn with_timeout<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let timeout = self.settings.provider_timeout;
        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| WebhookError::ProviderApi {
                status: None,
                message: format!("{operation} timed out after {}ms", timeout.as_millis()),
            })?
    }
}

/// Async mutexes keyed by value, created on demand and dropped when unused
struct KeyedLocks<K: Eq + Hash + Clone> {
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    async fn lock(&self, key: &K) -> KeyedGuard<K> {
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            locks: self.locks.clone(),
            key: key.clone(),
            guard: Some(guard),
        }
    }
}

struct KeyedGuard<K: Eq + Hash + Clone> {
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
