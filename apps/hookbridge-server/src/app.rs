//! Application state and initialization

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use hookbridge_core::AppConfig;
use hookbridge_webhook::{
    ChannelRunScheduler, InMemoryRegistrationStore, InboundDispatcher, InboundWebhookState,
    ProviderRegistry, RegistrationCoordinator, RegistrationSettings, RegistrationStore,
    RoutedEvent, RoutingKeyIndex, RunEventProcessor, StaticCredentialResolver,
};

use crate::cli::Args;
use crate::server::Server;

/// Capacity of the channel between inbound handling and the run processor
const RUN_CHANNEL_CAPACITY: usize = 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RegistrationCoordinator>,
    pub webhooks: Arc<InboundWebhookState>,
}

impl AppState {
    /// Wire the webhook stack from configuration.
    ///
    /// Returns the state and the receiving end of the run channel.
    pub async fn new(config: &AppConfig) -> Result<(Self, mpsc::Receiver<RoutedEvent>)> {
        info!("Initializing application components");

        let credentials = Arc::new(StaticCredentialResolver::from_config(&config.credentials));
        let registry = Arc::new(
            ProviderRegistry::from_config(
                &config.providers,
                config.webhooks.provider_timeout(),
                credentials,
            )
            .context("Failed to build provider registry")?,
        );
        info!(providers = ?registry.provider_ids(), "Provider registry ready");

        let index = Arc::new(RoutingKeyIndex::new());
        let store: Arc<dyn RegistrationStore> = Arc::new(InMemoryRegistrationStore::new());

        let coordinator = Arc::new(RegistrationCoordinator::new(
            registry.clone(),
            index.clone(),
            store.clone(),
            RegistrationSettings::from_webhook_settings(&config.webhooks),
        ));
        coordinator
            .restore()
            .await
            .context("Failed to restore routing index")?;

        let dispatcher = Arc::new(InboundDispatcher::new(
            registry,
            index,
            store,
            config.webhooks.verification_policy,
        ));
        info!(
            policy = config.webhooks.verification_policy.as_str(),
            "Inbound verification policy"
        );

        let (scheduler, receiver) = ChannelRunScheduler::new(RUN_CHANNEL_CAPACITY);
        let webhooks = Arc::new(InboundWebhookState::new(dispatcher, Arc::new(scheduler)));

        Ok((
            Self {
                coordinator,
                webhooks,
            },
            receiver,
        ))
    }
}

/// Main application
pub struct App {
    config: AppConfig,
    state: AppState,
    runs: mpsc::Receiver<RoutedEvent>,
}

impl App {
    /// Build the application with all dependencies
    pub async fn build(args: Args) -> Result<Self> {
        let mut config = AppConfig::load_from_file(args.config_path()?)
            .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;
        if let Some(port) = args.port {
            config.server.port = port;
        }

        let (state, runs) = AppState::new(&config).await?;

        Ok(Self {
            config,
            state,
            runs,
        })
    }

    /// Run the application
    pub async fn run(self) -> Result<()> {
        info!("Starting server");
        info!("HTTP address: {}", self.config.server.address());

        // Runs are handed to the workflow engine out of process; this
        // deployment records each hand-off.
        let processor = RunEventProcessor::new(self.runs).with_callback(|event| {
            info!(
                trigger_id = %event.trigger_id,
                provider = %event.provider,
                event_type = %event.event.event_type,
                delivery_id = %event.event.delivery_id,
                "Workflow run requested"
            );
        });
        tokio::spawn(processor.run());

        let server = Server::new(self.config.server, self.state)?;
        server.run().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookbridge_core::{ProviderConfig, ProvidersConfig, ServerConfig, WebhookSettings};

    fn test_config() -> AppConfig {
        AppConfig {
            server: ServerConfig::new(),
            webhooks: WebhookSettings::new("https://hooks.example.com"),
            providers: ProvidersConfig {
                github: ProviderConfig::new("https://api.github.com"),
                bitbucket: ProviderConfig::new("https://api.bitbucket.org"),
            },
            credentials: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_app_state_creation() {
        let result = AppState::new(&test_config()).await;
        assert!(result.is_ok());
    }
}
