//! HMAC signing backend
//!
//! Keyed HMAC-SHA256 over the payload, for air-gapped and CI environments
//! where no gpg keyring exists. The key is raw bytes read from a file the
//! operator provisions; key generation and rotation stay outside this tool.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::path::Path;
use tracing::debug;

use crate::audit::error::AuditError;
use crate::signer::Signer;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "hmac-sha256:";

/// Signer backed by a locally held symmetric key
#[derive(Clone)]
pub struct HmacSigner {
    key: Vec<u8>,
    key_source: String,
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key bytes stay out of debug output
        f.debug_struct("HmacSigner")
            .field("key_source", &self.key_source)
            .finish()
    }
}

impl HmacSigner {
    pub fn new(key: Vec<u8>, key_source: &str) -> Result<Self, AuditError> {
        if key.is_empty() {
            return Err(AuditError::Config {
                reason: format!("HMAC key from {key_source} is empty"),
            });
        }
        Ok(HmacSigner {
            key,
            key_source: key_source.to_string(),
        })
    }

    pub fn from_key_file(path: &Path) -> Result<Self, AuditError> {
        let key = std::fs::read(path).map_err(|e| AuditError::Config {
            reason: format!("failed to read HMAC key file {}: {e}", path.display()),
        })?;
        Self::new(key, &path.display().to_string())
    }

    fn mac(&self) -> Result<HmacSha256, AuditError> {
        HmacSha256::new_from_slice(&self.key).map_err(|e| AuditError::SignFailure {
            detail: format!("failed to create HMAC instance: {e}"),
        })
    }
}

#[async_trait]
impl Signer for HmacSigner {
    async fn sign(&self, payload: &[u8]) -> Result<String, AuditError> {
        let mut mac = self.mac()?;
        mac.update(payload);
        let result = mac.finalize();
        Ok(format!(
            "{SIGNATURE_PREFIX}{}",
            hex::encode(result.into_bytes())
        ))
    }

    async fn verify(&self, payload: &[u8], signature: &str) -> Result<bool, AuditError> {
        let hex_signature = signature
            .trim()
            .strip_prefix(SIGNATURE_PREFIX)
            .unwrap_or(signature.trim());

        let signature_bytes = match hex::decode(hex_signature) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("HMAC signature is not valid hex: {e}");
                return Ok(false);
            }
        };

        let mut mac = self.mac()?;
        mac.update(payload);

        // Constant-time comparison
        match mac.verify_slice(&signature_bytes) {
            Ok(()) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    fn describe(&self) -> String {
        format!("hmac-sha256 (key: {})", self.key_source)
    }
}
