//! Provider adapter registry

use crate::{
    credentials::CredentialResolver,
    integration::WebhookIntegration,
    providers::{build_http_client, ProviderClient},
    BitbucketWebhookIntegration, GitHubWebhookIntegration, Result, WebhookError,
};
use hookbridge_core::{ProviderId, ProvidersConfig};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Immutable map from provider id to adapter, built once at startup
pub struct ProviderRegistry {
    adapters: HashMap<ProviderId, Arc<dyn WebhookIntegration>>,
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Build a registry with every enabled provider from configuration
    pub fn from_config(
        config: &ProvidersConfig,
        timeout: Duration,
        credentials: Arc<dyn CredentialResolver>,
    ) -> Result<Self> {
        let http = build_http_client(timeout)?;
        let mut builder = Self::builder();

        if config.github.enabled {
            let client =
                ProviderClient::new(http.clone(), &config.github.api_base_url, credentials.clone());
            builder = builder.with(Arc::new(GitHubWebhookIntegration::new(client)));
        }
        if config.bitbucket.enabled {
            let client =
                ProviderClient::new(http, &config.bitbucket.api_base_url, credentials);
            builder = builder.with(Arc::new(BitbucketWebhookIntegration::new(client)));
        }

        Ok(builder.build())
    }

    /// Look up the adapter for a provider
    pub fn resolve(&self, provider: &ProviderId) -> Result<Arc<dyn WebhookIntegration>> {
        self.adapters
            .get(provider)
            .cloned()
            .ok_or_else(|| WebhookError::UnknownProvider(provider.to_string()))
    }

    pub fn provider_ids(&self) -> Vec<ProviderId> {
        let mut ids: Vec<_> = self.adapters.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[derive(Default)]
pub struct ProviderRegistryBuilder {
    adapters: HashMap<ProviderId, Arc<dyn WebhookIntegration>>,
}

impl ProviderRegistryBuilder {
    /// Add an adapter. A later adapter for the same provider replaces the earlier one.
    pub fn with(mut self, adapter: Arc<dyn WebhookIntegration>) -> Self {
        let provider = adapter.provider_id().clone();
        info!(provider = %provider, "Registering webhook integration");
        self.adapters.insert(provider, adapter);
        self
    }

    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            adapters: self.adapters,
        }
    }
}
