//! Provider adapters
//!
//! Each submodule implements [`crate::WebhookIntegration`] for one provider.
//! [`ProviderClient`] holds the HTTP plumbing they share.

mod bitbucket;
mod github;

pub use bitbucket::BitbucketWebhookIntegration;
pub use github::GitHubWebhookIntegration;

use crate::{credentials::CredentialResolver, Result, WebhookError};
use hookbridge_core::AccessInfo;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Build the HTTP client used for provider API calls
pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("hookbridge/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| WebhookError::ProviderApi {
            status: None,
            message: format!("failed to create HTTP client: {e}"),
        })
}

/// Authenticated access to one provider's REST API
#[derive(Clone)]
pub struct ProviderClient {
    http: Client,
    api_base: String,
    credentials: Arc<dyn CredentialResolver>,
}

impl ProviderClient {
    pub fn new(http: Client, api_base: &str, credentials: Arc<dyn CredentialResolver>) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Start an authenticated request to `path` (relative to the API base)
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        access_info: &AccessInfo,
    ) -> Result<RequestBuilder> {
        let token = self.credentials.access_token(access_info).await?;
        let url = format!("{}{}", self.api_base, path);
        debug!(method = %method, url = %url, "Calling provider API");

        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token.expose_secret()))
    }

    /// Send a request and parse a JSON response body
    pub async fn send_json(&self, request: RequestBuilder) -> Result<serde_json::Value> {
        let response = send(request).await?;
        let response = ensure_success(response).await?;

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| WebhookError::ProviderApi {
                status: None,
                message: format!("invalid response body: {e}"),
            })
    }

    /// Send a delete request. A `404` means the resource is already gone.
    pub async fn send_delete(&self, request: RequestBuilder) -> Result<()> {
        let response = send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            warn!("Provider webhook already removed");
            return Ok(());
        }

        ensure_success(response).await.map(|_| ())
    }
}

async fn send(request: RequestBuilder) -> Result<Response> {
    request.send().await.map_err(|e| WebhookError::ProviderApi {
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    })
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body
    };

    Err(WebhookError::ProviderApi {
        status: Some(status.as_u16()),
        message,
    })
}

/// Check one user-supplied URL path segment: `[A-Za-z0-9._-]`, never `.` or `..`
pub(crate) fn validate_path_segment(field: &str, value: &str) -> Result<()> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
    if value.is_empty() || value == "." || value == ".." || !value.chars().all(allowed) {
        return Err(WebhookError::InvalidSource(format!("invalid {field} {value:?}")));
    }
    Ok(())
}

/// Pull a string or numeric identifier field out of a provider response
pub(crate) fn response_id(body: &serde_json::Value, field: &str) -> Result<String> {
    match body.get(field) {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        _ => Err(WebhookError::ProviderApi {
            status: None,
            message: format!("response is missing webhook {field}"),
        }),
    }
}
