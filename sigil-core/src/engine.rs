//! Audit engine - orchestrates the signing and verification pipelines
//!
//! The engine owns one signer, one record store, and one anchor client,
//! all selected from configuration at construction. The signing pipeline
//! is hash, build manifest, sign, anchor, store, registry. Anchoring and
//! registry trouble degrade to outcomes and warnings; everything before
//! the record write aborts the operation instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::anchor::{AnchorClient, AnchorReceipt};
use crate::audit::error::AuditError;
use crate::audit::hasher::{hash_file, Digest};
use crate::audit::manifest::Manifest;
use crate::audit::record::{AuditRecord, RecordStore, RegistryEntry};
use crate::audit::verifier::{Verification, Verifier};
use crate::config::SigilConfig;
use crate::signer::{GpgSigner, HmacSigner, Signer};

/// Whether a signing operation should attempt anchoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorMode {
    /// Follow the `ledger.enabled` configuration
    Auto,
    /// Skip anchoring regardless of configuration (`--no-anchor`)
    Disabled,
}

/// What happened on the anchoring leg of a signing operation
#[derive(Debug, Clone, PartialEq)]
pub enum AnchorOutcome {
    Confirmed { transaction_id: String },
    Disabled,
    Failed { reason: String },
}

/// Result of a completed signing operation
#[derive(Debug)]
pub struct SignOutcome {
    pub record: AuditRecord,
    pub record_path: PathBuf,
    pub anchor: AnchorOutcome,
}

/// The audit engine
#[derive(Clone)]
pub struct Engine {
    config: SigilConfig,
    signer: Arc<dyn Signer>,
    store: RecordStore,
    anchor: AnchorClient,
}

impl Engine {
    /// Build an engine from configuration, selecting the signing backend
    ///
    /// A missing gpg identity is tolerated here so identity-less
    /// configurations can still verify; signing reports it instead.
    pub fn new(config: SigilConfig) -> Result<Self, AuditError> {
        let signer: Arc<dyn Signer> = match config.signer.backend.as_str() {
            "gpg" => Arc::new(GpgSigner::new(
                &config.signer.command,
                &config.signer.identity,
                config.signer.timeout_seconds,
            )),
            "hmac" => {
                let key_file = config.signer.key_file.as_ref().ok_or(AuditError::Config {
                    reason: "signer.key_file is required for the hmac backend".to_string(),
                })?;
                Arc::new(HmacSigner::from_key_file(key_file)?)
            }
            other => {
                return Err(AuditError::Config {
                    reason: format!("Unknown signer backend: {other}"),
                });
            }
        };

        info!("Audit engine using signer: {}", signer.describe());
        Ok(Self::with_signer(config, signer))
    }

    /// Build an engine around an explicit signer
    pub fn with_signer(config: SigilConfig, signer: Arc<dyn Signer>) -> Self {
        let store = RecordStore::new(&config.record_extension, &config.registry.path);
        let anchor = AnchorClient::new(config.ledger.clone());
        Engine {
            config,
            signer,
            store,
            anchor,
        }
    }

    /// Full signing pipeline for one artifact, record at the default path
    pub async fn sign_artifact(
        &self,
        artifact: &Path,
        component: &str,
        version: &str,
        mode: AnchorMode,
    ) -> Result<SignOutcome, AuditError> {
        let record_path = self.store.default_record_path(artifact);
        self.sign_artifact_to(artifact, component, version, mode, &record_path)
            .await
    }

    /// Full signing pipeline with an explicit record destination
    pub async fn sign_artifact_to(
        &self,
        artifact: &Path,
        component: &str,
        version: &str,
        mode: AnchorMode,
        record_path: &Path,
    ) -> Result<SignOutcome, AuditError> {
        if component.trim().is_empty() {
            return Err(AuditError::Config {
                reason: "component name must not be empty".to_string(),
            });
        }
        if version.trim().is_empty() {
            return Err(AuditError::Config {
                reason: "version must not be empty".to_string(),
            });
        }

        let digest = hash_file(artifact).await?;
        debug!("Artifact digest: {}", digest);

        let manifest = Manifest::build(component, version, digest, &self.config.auditor);
        let canonical = manifest.canonical_bytes();

        let signature = self.signer.sign(&canonical).await?;
        debug!("Obtained {} byte signature", signature.len());

        let anchor = match mode {
            AnchorMode::Disabled => AnchorOutcome::Disabled,
            AnchorMode::Auto if !self.config.ledger.enabled => AnchorOutcome::Disabled,
            AnchorMode::Auto if !self.anchor.is_configured() => {
                warn!("Anchoring is enabled but no ledger command is configured, skipping");
                AnchorOutcome::Disabled
            }
            AnchorMode::Auto => match self.anchor.anchor(&manifest, &signature).await {
                Ok(receipt) => AnchorOutcome::Confirmed {
                    transaction_id: receipt.transaction_id,
                },
                Err(e) => {
                    warn!("Anchoring failed, record remains locally verifiable: {e}");
                    AnchorOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            },
        };

        let record = AuditRecord::new(manifest, signature);
        self.store.save(&record, record_path)?;

        let anchored_tx = match &anchor {
            AnchorOutcome::Confirmed { transaction_id } => Some(transaction_id.clone()),
            _ => None,
        };
        if let Err(e) =
            self.store
                .append_registry(RegistryEntry::for_record(&record, record_path, anchored_tx))
        {
            warn!("Failed to update local registry: {e}");
        }

        info!(
            "Signed {} as {} v{}",
            artifact.display(),
            record.manifest.component,
            record.manifest.version
        );
        Ok(SignOutcome {
            record,
            record_path: record_path.to_path_buf(),
            anchor,
        })
    }

    /// Check an artifact against an audit record
    pub async fn verify_artifact(
        &self,
        artifact: &Path,
        record_path: &Path,
    ) -> Result<Verification, AuditError> {
        let verifier = Verifier::new(self.store.clone(), self.signer.clone());
        verifier.verify(artifact, record_path).await
    }

    /// Hash one artifact
    pub async fn digest_artifact(&self, artifact: &Path) -> Result<Digest, AuditError> {
        hash_file(artifact).await
    }

    /// Hash several artifacts concurrently, preserving input order
    pub async fn digest_artifacts(
        &self,
        artifacts: &[PathBuf],
    ) -> Vec<(PathBuf, Result<Digest, AuditError>)> {
        crate::audit::hasher::hash_files(artifacts).await
    }

    /// Re-anchor an already stored record in a fresh ledger transaction
    pub async fn anchor_existing(&self, record_path: &Path) -> Result<AnchorReceipt, AuditError> {
        let record = self.store.load(record_path)?;
        self.anchor.anchor_record(&record).await
    }

    pub fn config(&self) -> &SigilConfig {
        &self.config
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn signer_description(&self) -> String {
        self.signer.describe()
    }
}
