//! Access token resolution for provider API calls

use crate::{Result, WebhookError};
use async_trait::async_trait;
use dashmap::DashMap;
use hookbridge_core::{AccessInfo, CredentialsConfig};
use secrecy::SecretString;

/// Resolves a credential reference to a bearer token
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn access_token(&self, access_info: &AccessInfo) -> Result<SecretString>;
}

/// Credential resolver backed by a fixed token table
pub struct StaticCredentialResolver {
    tokens: DashMap<String, SecretString>,
}

impl StaticCredentialResolver {
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
        }
    }

    pub fn from_config(config: &CredentialsConfig) -> Self {
        let resolver = Self::new();
        for (connection_id, token) in &config.tokens {
            resolver.insert(connection_id, token);
        }
        resolver
    }

    pub fn with_token(self, connection_id: &str, token: &str) -> Self {
        self.insert(connection_id, token);
        self
    }

    pub fn insert(&self, connection_id: &str, token: &str) {
        self.tokens
            .insert(connection_id.to_string(), SecretString::new(token.to_string()));
    }
}

impl Default for StaticCredentialResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn access_token(&self, access_info: &AccessInfo) -> Result<SecretString> {
        self.tokens
            .get(&access_info.connection_id)
            .map(|t| t.clone())
            .ok_or_else(|| {
                WebhookError::Credentials(format!(
                    "no token for connection {}",
                    access_info.connection_id
                ))
            })
    }
}
