use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

// Newtype wrappers for type safety

/// Identifier of an external provider, as it appears in routes (e.g. `github`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a workflow trigger, assigned by the workflow platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerId(String);

impl TriggerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TriggerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for TriggerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier embedded in a callback URL; names one provider-side webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(Uuid);

impl EndpointId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for EndpointId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Reference to a stored credential; resolved to an access token at call time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessInfo {
    pub connection_id: String,
}

impl AccessInfo {
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
        }
    }
}

/// Opaque key that identifies one external event stream.
///
/// Keys are only produced through [`RoutingKeyBuilder`], which escapes every
/// component and canonicalizes the event list (sorted, deduplicated), so two
/// subscriptions to the same stream always yield the same key and distinct
/// streams never do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingKey(String);

impl RoutingKey {
    pub fn builder(provider: &ProviderId) -> RoutingKeyBuilder {
        RoutingKeyBuilder::new(provider)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds a [`RoutingKey`] from ordered components.
///
/// Layout: `provider.kind.scope....events...`. The number of scope components
/// is fixed per kind, so the trailing event components are unambiguous.
#[derive(Debug, Clone)]
pub struct RoutingKeyBuilder {
    parts: Vec<String>,
}

impl RoutingKeyBuilder {
    fn new(provider: &ProviderId) -> Self {
        Self {
            parts: vec![escape_component(provider.as_str())],
        }
    }

    pub fn component(mut self, value: &str) -> Self {
        self.parts.push(escape_component(value));
        self
    }

    pub fn events<S: AsRef<str>>(mut self, events: &[S]) -> Self {
        let canonical: BTreeSet<&str> = events.iter().map(AsRef::as_ref).collect();
        self.parts.extend(canonical.into_iter().map(escape_component));
        self
    }

    pub fn build(self) -> RoutingKey {
        RoutingKey(self.parts.join("."))
    }
}

fn escape_component(value: &str) -> String {
    value.replace('%', "%25").replace('.', "%2E")
}

/// A single labelled value shown for a trigger source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayProperty {
    pub key: String,
    pub value: String,
}

impl DisplayProperty {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Presentation data derived from a trigger source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayProperties {
    pub title: String,
    pub properties: Vec<DisplayProperty>,
}

/// What to do with a delivery when the secret or the signature is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPolicy {
    /// Reject the delivery.
    #[default]
    Strict,
    /// Accept it unverified. Every skip is logged with the delivery id.
    AllowUnsigned,
}

impl VerificationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::AllowUnsigned => "allow_unsigned",
        }
    }
}
