//! Webhook signature handling
//!
//! Provides HMAC-SHA256 signature generation and verification in the
//! `sha256=<hex>` header format used by GitHub and Bitbucket.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Signature algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureAlgorithm {
    /// HMAC-SHA256
    #[default]
    HmacSha256,
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HmacSha256 => "sha256",
        }
    }
}

/// Why a signature header was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("unsupported signature format")]
    UnsupportedFormat,

    #[error("malformed signature")]
    Malformed,

    #[error("invalid signature")]
    Mismatch,
}

/// Webhook signer for generating signatures
pub struct WebhookSigner {
    secret: Vec<u8>,
    algorithm: SignatureAlgorithm,
}

impl WebhookSigner {
    /// Create a new signer with a secret
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            algorithm: SignatureAlgorithm::default(),
        }
    }

    /// Generate the signature header value for a payload
    pub fn sign(&self, payload: &[u8]) -> String {
        format!("{}={}", self.algorithm.as_str(), hex::encode(self.compute(payload)))
    }

    fn compute(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .expect("HMAC can accept any key length");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Webhook verifier for validating signatures
pub struct WebhookVerifier {
    secret: Vec<u8>,
    algorithm: SignatureAlgorithm,
}

impl WebhookVerifier {
    /// Create a new verifier with a secret
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            algorithm: SignatureAlgorithm::default(),
        }
    }

    /// Verify a `sha256=<hex>` signature against the raw, unparsed body.
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<(), SignatureError> {
        let prefix = format!("{}=", self.algorithm.as_str());
        let encoded = signature_header
            .trim()
            .strip_prefix(prefix.as_str())
            .ok_or(SignatureError::UnsupportedFormat)?;
        let expected = hex::decode(encoded).map_err(|_| SignatureError::Malformed)?;

        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .map_err(|_| SignatureError::Malformed)?;
        mac.update(payload);

        // verify_slice compares in constant time
        mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
    }
}

/// Generate a secure random webhook secret
pub fn generate_webhook_secret() -> String {
    use rand::Rng;
    let secret: [u8; 32] = rand::thread_rng().gen();
    format!("whsec_{}", hex::encode(secret))
}
