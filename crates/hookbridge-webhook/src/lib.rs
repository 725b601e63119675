//! Webhook integration protocol layer for Hookbridge
//!
//! This crate lets external providers deliver webhooks that trigger workflow runs:
//! - A uniform adapter contract implemented once per provider
//! - Deterministic routing keys derived from a trigger's configured source
//! - Provider-side webhook registration and teardown
//! - Authentication and normalization of inbound deliveries
//!
//! # Features
//!
//! - **Provider Adapters**: GitHub and Bitbucket Cloud implementations of [`WebhookIntegration`]
//! - **Signature Verification**: HMAC-SHA256 over the raw request body, constant-time compare
//! - **Registration**: one provider-side webhook per routing key, shared by every trigger at that key
//! - **Dispatch**: routes one delivery to every trigger subscribed at its key
//!
//! # Example
//!
//! ```rust,ignore
//! use hookbridge_webhook::{
//!     InboundDispatcher, InMemoryRegistrationStore, ProviderRegistry,
//!     RegistrationCoordinator, RoutingKeyIndex,
//! };
//! use std::sync::Arc;
//!
//! let registry = Arc::new(ProviderRegistry::from_config(&config.providers, timeout, credentials)?);
//! let index = Arc::new(RoutingKeyIndex::new());
//! let store = Arc::new(InMemoryRegistrationStore::new());
//!
//! let coordinator = RegistrationCoordinator::new(registry.clone(), index.clone(), store.clone(), settings);
//! let outcome = coordinator
//!     .register_trigger(&"trigger-1".into(), &"github".into(), &source, &access_info)
//!     .await?;
//!
//! let dispatcher = InboundDispatcher::new(registry, index, store, policy);
//! let routed = dispatcher.dispatch(&outcome.endpoint_id, request).await?;
//! ```

// Module order matters due to dependencies
pub mod signature;
pub mod events;
pub mod integration;
pub mod credentials;
pub mod providers;
pub mod registry;
pub mod routing;
pub mod store;
pub mod retry;
pub mod registration;
pub mod scheduler;
pub mod dispatcher;
pub mod inbound;

pub use signature::*;
pub use events::*;
pub use integration::*;
pub use credentials::*;
pub use providers::{BitbucketWebhookIntegration, GitHubWebhookIntegration};
pub use registry::*;
pub use routing::*;
pub use store::*;
pub use retry::*;
pub use registration::*;
pub use scheduler::*;
pub use dispatcher::*;
pub use inbound::*;

use axum::http::StatusCode;
use thiserror::Error;

/// Webhook errors
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Unsupported subresource for {provider}: {subresource}")]
    UnsupportedSubresource {
        provider: String,
        subresource: String,
    },

    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Could not verify webhook payload: {reason} [delivery_id = {delivery_id}]")]
    Verification { delivery_id: String, reason: String },

    #[error("Invalid delivery: {0}")]
    InvalidDelivery(String),

    #[error("Provider API error (status {status:?}): {message}")]
    ProviderApi {
        status: Option<u16>,
        message: String,
    },

    #[error("Credential resolution failed: {0}")]
    Credentials(String),

    #[error("Trigger not found: {0}")]
    TriggerNotFound(String),

    #[error("Run scheduling failed: {0}")]
    Scheduling(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl WebhookError {
    pub(crate) fn verification(delivery_id: &str, reason: impl Into<String>) -> Self {
        Self::Verification {
            delivery_id: delivery_id.to_string(),
            reason: reason.into(),
        }
    }

    /// HTTP status used when this error reaches a route handler
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownProvider(_) | Self::TriggerNotFound(_) => StatusCode::NOT_FOUND,
            Self::UnsupportedSubresource { .. } | Self::InvalidSource(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Verification { .. } => StatusCode::UNAUTHORIZED,
            Self::InvalidDelivery(_) => StatusCode::BAD_REQUEST,
            Self::ProviderApi { .. } | Self::Credentials(_) => StatusCode::BAD_GATEWAY,
            Self::Scheduling(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a provider call that failed this way may be repeated safely
    /// when the call itself is idempotent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ProviderApi { status: None, .. } => true,
            Self::ProviderApi {
                status: Some(code), ..
            } => *code >= 500 || *code == 429,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, WebhookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            WebhookError::UnknownProvider("gitlab".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            WebhookError::verification("d-1", "invalid signature").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            WebhookError::UnsupportedSubresource {
                provider: "github".into(),
                subresource: "enterprise".into(),
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_verification_message_carries_delivery_id() {
        let err = WebhookError::verification("abc-123", "invalid signature");
        assert!(err.to_string().contains("abc-123"));
        assert!(err.to_string().contains("invalid signature"));
    }

    #[test]
    fn test_transient_classification() {
        let timeout = WebhookError::ProviderApi {
            status: None,
            message: "timed out".into(),
        };
        let unavailable = WebhookError::ProviderApi {
            status: Some(503),
            message: "unavailable".into(),
        };
        let forbidden = WebhookError::ProviderApi {
            status: Some(403),
            message: "forbidden".into(),
        };

        assert!(timeout.is_transient());
        assert!(unavailable.is_transient());
        assert!(!forbidden.is_transient());
        assert!(!WebhookError::InvalidSource("x".into()).is_transient());
    }
}
