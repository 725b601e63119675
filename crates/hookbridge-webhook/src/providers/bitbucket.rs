//! Bitbucket Cloud webhook integration

use super::{response_id, validate_path_segment, ProviderClient};
use crate::{
    events::{ExternalWebhookHandle, HandleWebhookOptions, NormalizedWebhookEvent, WebhookConfig},
    integration::{parse_source, validate_events, DeliveryHeaders, WebhookIntegration},
    Result,
};
use async_trait::async_trait;
use hookbridge_core::{AccessInfo, DisplayProperties, DisplayProperty, ProviderId, RoutingKey};
use reqwest::Method;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

const DELIVERY_HEADERS: DeliveryHeaders = DeliveryHeaders {
    delivery_id: "x-request-uuid",
    event_type: "x-event-key",
    signature: "x-hub-signature",
    excluded: &[
        "x-event-key",
        "x-request-uuid",
        "x-hub-signature",
        "x-attempt-number",
        "content-type",
        "content-length",
        "accept",
        "accept-encoding",
        "x-forwarded-proto",
    ],
};

/// Bitbucket trigger source
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "subresource", rename_all = "snake_case")]
pub enum BitbucketSource {
    Repository {
        workspace: String,
        repo_slug: String,
        events: Vec<String>,
    },
    Workspace {
        workspace: String,
        events: Vec<String>,
    },
}

impl BitbucketSource {
    const SUBRESOURCES: &'static [&'static str] = &["repository", "workspace"];

    fn events(&self) -> &[String] {
        match self {
            Self::Repository { events, .. } | Self::Workspace { events, .. } => events,
        }
    }

    fn validate(&self) -> Result<()> {
        validate_events(self.events())?;
        match self {
            Self::Repository {
                workspace,
                repo_slug,
                ..
            } => {
                validate_path_segment("workspace", workspace)?;
                validate_path_segment("repo_slug", repo_slug)?;
            }
            Self::Workspace { workspace, .. } => validate_path_segment("workspace", workspace)?,
        }
        Ok(())
    }

    fn hooks_path(&self) -> String {
        match self {
            Self::Repository {
                workspace,
                repo_slug,
                ..
            } => format!("/2.0/repositories/{workspace}/{repo_slug}/hooks"),
            Self::Workspace { workspace, .. } => format!("/2.0/workspaces/{workspace}/hooks"),
        }
    }
}

/// Webhook integration for Bitbucket Cloud
pub struct BitbucketWebhookIntegration {
    provider_id: ProviderId,
    client: ProviderClient,
}

impl BitbucketWebhookIntegration {
    pub const PROVIDER_ID: &'static str = "bitbucket";

    pub fn new(client: ProviderClient) -> Self {
        Self {
            provider_id: ProviderId::new(Self::PROVIDER_ID),
            client,
        }
    }

    pub fn parse(&self, source: &serde_json::Value) -> Result<BitbucketSource> {
        let source: BitbucketSource =
            parse_source(&self.provider_id, BitbucketSource::SUBRESOURCES, source)?;
        source.validate()?;
        Ok(source)
    }
}

#[async_trait]
impl WebhookIntegration for BitbucketWebhookIntegration {
    fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    fn key_for_source(&self, source: &serde_json::Value) -> Result<RoutingKey> {
        let key = match self.parse(source)? {
            BitbucketSource::Repository {
                workspace,
                repo_slug,
                events,
            } => RoutingKey::builder(&self.provider_id)
                .component("repository")
                .component(&workspace.to_ascii_lowercase())
                .component(&repo_slug.to_ascii_lowercase())
                .events(&events),
            BitbucketSource::Workspace { workspace, events } => {
                RoutingKey::builder(&self.provider_id)
                    .component("workspace")
                    .component(&workspace.to_ascii_lowercase())
                    .events(&events)
            }
        };
        Ok(key.build())
    }

    async fn register_webhook(
        &self,
        config: &WebhookConfig,
        source: &serde_json::Value,
    ) -> Result<ExternalWebhookHandle> {
        let source = self.parse(source)?;

        let body = json!({
            "description": "hookbridge",
            "url": config.callback_url,
            "active": true,
            "events": source.events(),
            "secret": config.secret.expose_secret(),
        });

        let request = self
            .client
            .request(Method::POST, &source.hooks_path(), &config.access_info)
            .await?
            .header("Accept", "application/json")
            .json(&body);
        let created = self.client.send_json(request).await?;
        let handle = ExternalWebhookHandle::new(response_id(&created, "uuid")?);

        info!(
            provider = Self::PROVIDER_ID,
            path = %source.hooks_path(),
            external_id = %handle,
            "Created Bitbucket webhook"
        );

        Ok(handle)
    }

    async fn unregister_webhook(
        &self,
        access_info: &AccessInfo,
        source: &serde_json::Value,
        handle: &ExternalWebhookHandle,
    ) -> Result<()> {
        let source = self.parse(source)?;
        let path = format!("{}/{}", source.hooks_path(), handle);

        let request = self
            .client
            .request(Method::DELETE, &path, access_info)
            .await?;
        self.client.send_delete(request).await?;

        info!(provider = Self::PROVIDER_ID, path = %path, "Deleted Bitbucket webhook");
        Ok(())
    }

    fn handle_webhook_request(
        &self,
        options: HandleWebhookOptions<'_>,
    ) -> Result<Vec<NormalizedWebhookEvent>> {
        DELIVERY_HEADERS.normalize(&self.provider_id, options)
    }

    fn display_properties(&self, source: &serde_json::Value) -> Result<DisplayProperties> {
        let source = self.parse(source)?;

        let title = format!("Bitbucket {}", source.events().join(", "));
        let properties = match &source {
            BitbucketSource::Repository {
                workspace,
                repo_slug,
                ..
            } => vec![
                DisplayProperty::new("Workspace", workspace),
                DisplayProperty::new("Repository", repo_slug),
            ],
            BitbucketSource::Workspace { workspace, .. } => {
                vec![DisplayProperty::new("Workspace", workspace)]
            }
        };

        Ok(DisplayProperties { title, properties })
    }
}
