//! Audit verification logic - the runtime check of artifact integrity
//!
//! The verifier replays the signing pipeline against what is on disk now.
//! Checks run in a fixed order and stop at the first failure: record shape,
//! then artifact digest, then signature. A digest mismatch is reported even
//! when the signature would also fail, because a changed artifact is the
//! more actionable finding.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::audit::error::AuditError;
use crate::audit::hasher::{hash_file, Digest};
use crate::audit::manifest::Manifest;
use crate::audit::record::RecordStore;
use crate::signer::Signer;

/// Summary of a successful verification, taken from the trusted manifest
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub component: String,
    pub version: String,
    pub auditor: String,
    pub timestamp: String,
    pub digest: Digest,
}

impl Verification {
    fn from_manifest(manifest: &Manifest) -> Self {
        Verification {
            component: manifest.component.clone(),
            version: manifest.version.clone(),
            auditor: manifest.auditor.clone(),
            timestamp: manifest.timestamp.clone(),
            digest: manifest.digest.clone(),
        }
    }
}

/// Audit verifier - holds the record store and signing backend
#[derive(Clone)]
pub struct Verifier {
    store: RecordStore,
    signer: Arc<dyn Signer>,
}

impl Verifier {
    pub fn new(store: RecordStore, signer: Arc<dyn Signer>) -> Self {
        Verifier { store, signer }
    }

    /// Check an artifact against its audit record
    pub async fn verify(
        &self,
        artifact: &Path,
        record_path: &Path,
    ) -> Result<Verification, AuditError> {
        debug!(
            "Verifying {} against record {}",
            artifact.display(),
            record_path.display()
        );

        let record = self.store.load(record_path)?;

        let actual = hash_file(artifact).await?;
        if actual != record.manifest.digest {
            let err = AuditError::HashMismatch {
                path: artifact.to_path_buf(),
                expected: record.manifest.digest.to_string(),
                actual: actual.to_string(),
            };
            err.log_if_security_critical();
            return Err(err);
        }
        debug!("Artifact digest matches manifest: {}", actual);

        let canonical = record.manifest.canonical_bytes();
        let accepted = self.signer.verify(&canonical, &record.signature).await?;
        if !accepted {
            let err = AuditError::SignatureInvalid {
                path: record_path.to_path_buf(),
                detail: format!("rejected by {}", self.signer.describe()),
            };
            err.log_if_security_critical();
            return Err(err);
        }

        info!(
            "Verified {} as {} v{} (signed by {})",
            artifact.display(),
            record.manifest.component,
            record.manifest.version,
            record.manifest.auditor
        );
        Ok(Verification::from_manifest(&record.manifest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::record::AuditRecord;
    use crate::signer::MockSigner;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use tempfile::TempDir;

    async fn signed_fixture(
        temp_dir: &TempDir,
        contents: &[u8],
    ) -> (PathBuf, PathBuf, RecordStore) {
        let artifact = temp_dir.path().join("artifact.bin");
        std::fs::write(&artifact, contents).unwrap();

        let digest = hash_file(&artifact).await.unwrap();
        let manifest = Manifest::build("billing-service", "1.0.0", digest, "sigil");

        let signer = MockSigner::accepting();
        let signature = signer.sign(&manifest.canonical_bytes()).await.unwrap();

        let store = RecordStore::new("sigil", &temp_dir.path().join("registry.json"));
        let record_path = store.default_record_path(&artifact);
        store
            .save(&AuditRecord::new(manifest, signature), &record_path)
            .unwrap();

        (artifact, record_path, store)
    }

    #[tokio::test]
    async fn test_verify_accepts_untouched_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let (artifact, record_path, store) = signed_fixture(&temp_dir, b"release payload").await;

        let verifier = Verifier::new(store, Arc::new(MockSigner::accepting()));
        let verification = verifier.verify(&artifact, &record_path).await.unwrap();

        assert_eq!(verification.component, "billing-service");
        assert_eq!(verification.version, "1.0.0");
        assert_eq!(verification.auditor, "sigil");
    }

    #[tokio::test]
    async fn test_verify_detects_modified_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let (artifact, record_path, store) = signed_fixture(&temp_dir, b"release payload").await;

        std::fs::write(&artifact, b"tampered payload").unwrap();

        let verifier = Verifier::new(store, Arc::new(MockSigner::accepting()));
        let result = verifier.verify(&artifact, &record_path).await;

        match result {
            Err(AuditError::HashMismatch {
                expected, actual, ..
            }) => {
                assert_ne!(expected, actual);
            }
            other => panic!("expected HashMismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_verify_detects_rejected_signature() {
        let temp_dir = TempDir::new().unwrap();
        let (artifact, record_path, store) = signed_fixture(&temp_dir, b"release payload").await;

        let rejecting = MockSigner {
            fail_sign: false,
            reject_all: true,
        };
        let verifier = Verifier::new(store, Arc::new(rejecting));
        let result = verifier.verify(&artifact, &record_path).await;

        assert!(matches!(result, Err(AuditError::SignatureInvalid { .. })));
    }

    #[tokio::test]
    async fn test_malformed_record_reported_before_hashing() {
        let temp_dir = TempDir::new().unwrap();
        let store = RecordStore::new("sigil", &temp_dir.path().join("registry.json"));

        // Neither file is usable; the record shape failure must win
        let record_path = temp_dir.path().join("broken.sigil");
        std::fs::write(&record_path, "{ not json").unwrap();
        let missing_artifact = temp_dir.path().join("never-written.bin");

        let verifier = Verifier::new(store, Arc::new(MockSigner::accepting()));
        let result = verifier.verify(&missing_artifact, &record_path).await;

        assert!(matches!(result, Err(AuditError::MalformedRecord { .. })));
    }

    #[tokio::test]
    async fn test_hash_mismatch_reported_before_signature() {
        let temp_dir = TempDir::new().unwrap();
        let (artifact, record_path, store) = signed_fixture(&temp_dir, b"release payload").await;

        std::fs::write(&artifact, b"tampered payload").unwrap();

        // The signer would also reject, but the digest check runs first
        let rejecting = MockSigner {
            fail_sign: false,
            reject_all: true,
        };
        let verifier = Verifier::new(store, Arc::new(rejecting));
        let result = verifier.verify(&artifact, &record_path).await;

        assert!(matches!(result, Err(AuditError::HashMismatch { .. })));
    }

    #[tokio::test]
    async fn test_missing_artifact_with_valid_record() {
        let temp_dir = TempDir::new().unwrap();
        let (artifact, record_path, store) = signed_fixture(&temp_dir, b"release payload").await;

        std::fs::remove_file(&artifact).unwrap();

        let verifier = Verifier::new(store, Arc::new(MockSigner::accepting()));
        let result = verifier.verify(&artifact, &record_path).await;

        assert!(matches!(result, Err(AuditError::ArtifactNotFound { .. })));
    }

    #[tokio::test]
    async fn test_missing_record() {
        let temp_dir = TempDir::new().unwrap();
        let (artifact, _, store) = signed_fixture(&temp_dir, b"release payload").await;

        let verifier = Verifier::new(store, Arc::new(MockSigner::accepting()));
        let result = verifier
            .verify(&artifact, &temp_dir.path().join("absent.sigil"))
            .await;

        assert!(matches!(result, Err(AuditError::RecordNotFound { .. })));
    }
}
