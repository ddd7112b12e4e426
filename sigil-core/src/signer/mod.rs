//! Signing backend trait - Abstraction over signature providers
//!
//! This trait allows swapping between different signing backends:
//! - GPG (external subprocess, default)
//! - HMAC (keyed digest, hermetic environments)
//! - Mock (testing)

use async_trait::async_trait;

use crate::audit::error::AuditError;

pub mod gpg;
pub mod hmac;

pub use gpg::GpgSigner;
pub use hmac::HmacSigner;

/// Trait for signature backends
///
/// Implementations produce and check armored detached signatures over a
/// byte payload. They never see the artifact itself, only the canonical
/// manifest bytes handed to them.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Produce an armored detached signature over the payload
    ///
    /// Any backend trouble (missing binary, bad identity, timeout) must
    /// surface as `AuditError::SignFailure`.
    async fn sign(&self, payload: &[u8]) -> Result<String, AuditError>;

    /// Check an armored detached signature against the payload
    ///
    /// Returns `Ok(false)` when the backend examined the signature and
    /// rejected it. `Err` is reserved for the backend failing to run at all.
    async fn verify(&self, payload: &[u8], signature: &str) -> Result<bool, AuditError>;

    /// Backend identifier for logging/debugging
    fn describe(&self) -> String;
}

/// Mock signer for testing
#[cfg(test)]
pub struct MockSigner {
    pub fail_sign: bool,
    pub reject_all: bool,
}

#[cfg(test)]
impl MockSigner {
    pub fn accepting() -> Self {
        MockSigner {
            fail_sign: false,
            reject_all: false,
        }
    }

    fn expected_signature(payload: &[u8]) -> String {
        let digest = crate::audit::hasher::hash_bytes(payload);
        format!(
            "-----BEGIN MOCK SIGNATURE-----\n{}\n-----END MOCK SIGNATURE-----",
            digest.as_str()
        )
    }
}

#[cfg(test)]
#[async_trait]
impl Signer for MockSigner {
    async fn sign(&self, payload: &[u8]) -> Result<String, AuditError> {
        if self.fail_sign {
            return Err(AuditError::SignFailure {
                detail: "mock signer configured to fail".to_string(),
            });
        }
        Ok(Self::expected_signature(payload))
    }

    async fn verify(&self, payload: &[u8], signature: &str) -> Result<bool, AuditError> {
        if self.reject_all {
            return Ok(false);
        }
        Ok(signature == Self::expected_signature(payload))
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
