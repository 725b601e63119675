use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::types::VerificationPolicy;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub webhooks: WebhookSettings,
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_env("HOOKBRIDGE")
    }

    /// Load configuration from environment with custom prefix
    pub fn load_from_env(prefix: &str) -> Result<Self, ConfigError> {
        let builder = with_defaults(Config::builder())?.add_source(
            Environment::with_prefix(prefix)
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load configuration from file with environment overrides
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let builder = with_defaults(Config::builder())?
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("HOOKBRIDGE")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    builder
        .set_default("server.host", default_host())?
        .set_default("server.port", i64::from(default_port()))?
        .set_default("webhooks.callback_base_url", "http://localhost:8080")?
        .set_default("webhooks.verification_policy", "strict")?
        .set_default("webhooks.provider_timeout_secs", default_provider_timeout_secs() as i64)?
        .set_default("webhooks.delete_max_attempts", i64::from(default_delete_max_attempts()))?
        .set_default("webhooks.delete_initial_delay_ms", default_delete_initial_delay_ms() as i64)?
        .set_default("providers.github.enabled", true)?
        .set_default("providers.github.api_base_url", "https://api.github.com")?
        .set_default("providers.bitbucket.enabled", true)?
        .set_default("providers.bitbucket.api_base_url", "https://api.bitbucket.org")
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }

    pub fn with_host(mut self, host: String) -> Self {
        self.host = host;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Webhook registration and verification settings
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSettings {
    /// Public base URL that providers deliver to
    pub callback_base_url: String,
    #[serde(default)]
    pub verification_policy: VerificationPolicy,
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
    #[serde(default = "default_delete_max_attempts")]
    pub delete_max_attempts: u32,
    #[serde(default = "default_delete_initial_delay_ms")]
    pub delete_initial_delay_ms: u64,
}

impl WebhookSettings {
    pub fn new(callback_base_url: impl Into<String>) -> Self {
        Self {
            callback_base_url: callback_base_url.into(),
            verification_policy: VerificationPolicy::default(),
            provider_timeout_secs: default_provider_timeout_secs(),
            delete_max_attempts: default_delete_max_attempts(),
            delete_initial_delay_ms: default_delete_initial_delay_ms(),
        }
    }

    pub fn with_verification_policy(mut self, policy: VerificationPolicy) -> Self {
        self.verification_policy = policy;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout_secs = timeout.as_secs();
        self
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn delete_initial_delay(&self) -> Duration {
        Duration::from_millis(self.delete_initial_delay_ms)
    }
}

fn default_provider_timeout_secs() -> u64 {
    10
}

fn default_delete_max_attempts() -> u32 {
    3
}

fn default_delete_initial_delay_ms() -> u64 {
    500
}

/// Per-provider settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub api_base_url: String,
}

impl ProviderConfig {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            enabled: true,
            api_base_url: api_base_url.into(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    pub github: ProviderConfig,
    pub bitbucket: ProviderConfig,
}

/// Static access tokens keyed by connection id.
///
/// Stands in for the platform's credential service in single-node deployments.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}
