//! GitHub webhook integration
//!
//! Repository and organization webhooks via the REST API, verified with the
//! `X-Hub-Signature-256` header.

use super::{response_id, validate_path_segment, ProviderClient};
use crate::{
    events::{ExternalWebhookHandle, HandleWebhookOptions, NormalizedWebhookEvent, WebhookConfig},
    integration::{parse_source, validate_events, DeliveryHeaders, WebhookIntegration},
    Result, WebhookError,
};
use async_trait::async_trait;
use hookbridge_core::{AccessInfo, DisplayProperties, DisplayProperty, ProviderId, RoutingKey};
use reqwest::{Method, RequestBuilder};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

const API_VERSION: &str = "2022-11-28";

const DELIVERY_HEADERS: DeliveryHeaders = DeliveryHeaders {
    delivery_id: "x-github-delivery",
    event_type: "x-github-event",
    signature: "x-hub-signature-256",
    excluded: &[
        "x-github-event",
        "x-github-delivery",
        "x-hub-signature-256",
        "x-hub-signature",
        "content-type",
        "content-length",
        "accept",
        "accept-encoding",
        "x-forwarded-proto",
    ],
};

/// GitHub trigger source
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "subresource", rename_all = "snake_case")]
pub enum GitHubSource {
    Repository { repo: String, events: Vec<String> },
    Organization { org: String, events: Vec<String> },
}

impl GitHubSource {
    const SUBRESOURCES: &'static [&'static str] = &["repository", "organization"];

    fn events(&self) -> &[String] {
        match self {
            Self::Repository { events, .. } | Self::Organization { events, .. } => events,
        }
    }

    fn validate(&self) -> Result<()> {
        validate_events(self.events())?;
        match self {
            Self::Repository { repo, .. } => match repo.split_once('/') {
                Some((owner, name)) => {
                    validate_path_segment("repo owner", owner)?;
                    validate_path_segment("repo name", name)?;
                }
                None => {
                    return Err(WebhookError::InvalidSource(format!(
                        "repo must be owner/name, got {repo:?}"
                    )));
                }
            },
            Self::Organization { org, .. } => validate_path_segment("org", org)?,
        }
        Ok(())
    }

    fn hooks_path(&self) -> String {
        match self {
            Self::Repository { repo, .. } => format!("/repos/{repo}/hooks"),
            Self::Organization { org, .. } => format!("/orgs/{org}/hooks"),
        }
    }
}

/// Webhook integration for github.com (or a GitHub Enterprise API base)
pub struct GitHubWebhookIntegration {
    provider_id: ProviderId,
    client: ProviderClient,
}

impl GitHubWebhookIntegration {
    pub const PROVIDER_ID: &'static str = "github";

    pub fn new(client: ProviderClient) -> Self {
        Self {
            provider_id: ProviderId::new(Self::PROVIDER_ID),
            client,
        }
    }

    pub fn parse(&self, source: &serde_json::Value) -> Result<GitHubSource> {
        let source: GitHubSource =
            parse_source(&self.provider_id, GitHubSource::SUBRESOURCES, source)?;
        source.validate()?;
        Ok(source)
    }

    async fn api_request(
        &self,
        method: Method,
        path: &str,
        access_info: &AccessInfo,
    ) -> Result<RequestBuilder> {
        Ok(self
            .client
            .request(method, path, access_info)
            .await?
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION))
    }
}

#[async_trait]
impl WebhookIntegration for GitHubWebhookIntegration {
    fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    fn key_for_source(&self, source: &serde_json::Value) -> Result<RoutingKey> {
        let key = match self.parse(source)? {
            GitHubSource::Repository { repo, events } => RoutingKey::builder(&self.provider_id)
                .component("repository")
                .component(&repo.to_ascii_lowercase())
                .events(&events),
            GitHubSource::Organization { org, events } => RoutingKey::builder(&self.provider_id)
                .component("organization")
                .component(&org.to_ascii_lowercase())
                .events(&events),
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
            "name": "web",
            "active": true,
            "events": source.events(),
            "config": {
                "url": config.callback_url,
                "content_type": "json",
                "secret": config.secret.expose_secret(),
                "insecure_ssl": "0",
            },
        });

        let request = self
            .api_request(Method::POST, &source.hooks_path(), &config.access_info)
            .await?
            .json(&body);
        let created = self.client.send_json(request).await?;
        let handle = ExternalWebhookHandle::new(response_id(&created, "id")?);

        info!(
            provider = Self::PROVIDER_ID,
            path = %source.hooks_path(),
            external_id = %handle,
            "Created GitHub webhook"
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

        let request = self.api_request(Method::DELETE, &path, access_info).await?;
        self.client.send_delete(request).await?;

        info!(provider = Self::PROVIDER_ID, path = %path, "Deleted GitHub webhook");
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

        let title = format!("GitHub {}", source.events().join(", "));
        let properties = match &source {
            GitHubSource::Repository { repo, .. } => vec![DisplayProperty::new("Repo", repo)],
            GitHubSource::Organization { org, .. } => {
                vec![DisplayProperty::new("Organization", org)]
            }
        };

        Ok(DisplayProperties { title, properties })
    }
}
