//! Durable audit records and the on-disk store that owns them
//!
//! An audit record pairs a manifest with its detached signature. The store
//! writes records next to the artifact they describe and keeps a local
//! registry of every signing operation for bookkeeping. The registry carries
//! no trust semantics: it is never signed and never consulted during
//! verification.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::error::AuditError;
use crate::audit::manifest::Manifest;

/// The unit of trust: a manifest and the armored signature over its
/// canonical bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditRecord {
    pub manifest: Manifest,
    pub signature: String,
}

impl AuditRecord {
    pub fn new(manifest: Manifest, signature: String) -> Self {
        AuditRecord {
            manifest,
            signature,
        }
    }

    /// Structural checks applied when a record arrives from disk
    pub fn validate(&self) -> Result<(), String> {
        self.manifest.validate()?;
        if self.signature.trim().is_empty() {
            return Err("signature must not be empty".to_string());
        }
        Ok(())
    }
}

/// One bookkeeping row per signing operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: String,
    pub component: String,
    pub version: String,
    pub digest: String,
    pub record_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchored_tx: Option<String>,
    pub created_at: String,
}

impl RegistryEntry {
    pub fn for_record(
        record: &AuditRecord,
        record_path: &Path,
        anchored_tx: Option<String>,
    ) -> Self {
        RegistryEntry {
            id: Uuid::now_v7().to_string(),
            component: record.manifest.component.clone(),
            version: record.manifest.version.clone(),
            digest: record.manifest.digest.to_string(),
            record_path: record_path.to_path_buf(),
            anchored_tx,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Sole owner of persisted audit records and the local registry
#[derive(Debug, Clone)]
pub struct RecordStore {
    extension: String,
    registry_path: PathBuf,
}

impl RecordStore {
    pub fn new(extension: &str, registry_path: &Path) -> Self {
        RecordStore {
            extension: extension.trim_start_matches('.').to_string(),
            registry_path: registry_path.to_path_buf(),
        }
    }

    /// Default record location: the artifact path with the record extension
    /// appended (`hello.txt` becomes `hello.txt.sigil`)
    pub fn default_record_path(&self, artifact: &Path) -> PathBuf {
        let mut path = artifact.as_os_str().to_os_string();
        path.push(".");
        path.push(&self.extension);
        PathBuf::from(path)
    }

    /// Persist a record as human-readable JSON
    pub fn save(&self, record: &AuditRecord, path: &Path) -> Result<(), AuditError> {
        let record_io = |source| AuditError::RecordIo {
            path: path.to_path_buf(),
            source,
        };

        let mut json = serde_json::to_string_pretty(record)
            .map_err(|e| record_io(std::io::Error::other(e)))?;
        json.push('\n');

        std::fs::write(path, json).map_err(record_io)?;
        info!("Audit record written to: {}", path.display());
        Ok(())
    }

    /// Load a record, classifying missing-file and shape trouble separately
    pub fn load(&self, path: &Path) -> Result<AuditRecord, AuditError> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| AuditError::RecordNotFound {
                path: path.to_path_buf(),
                source,
            })?;

        let record: AuditRecord =
            serde_json::from_str(&contents).map_err(|e| AuditError::MalformedRecord {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        record
            .validate()
            .map_err(|reason| AuditError::MalformedRecord {
                path: path.to_path_buf(),
                reason,
            })?;

        Ok(record)
    }

    /// Append one registry row, creating the registry file on first use
    pub fn append_registry(&self, entry: RegistryEntry) -> Result<(), AuditError> {
        let registry_io = |source| AuditError::RecordIo {
            path: self.registry_path.clone(),
            source,
        };

        if let Some(parent) = self.registry_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(registry_io)?;
            }
        }

        let mut entries = self.load_registry()?;
        debug!(
            "Appending registry entry for {} ({} existing entries)",
            entry.component,
            entries.len()
        );
        entries.push(entry);

        let mut json = serde_json::to_string_pretty(&entries)
            .map_err(|e| registry_io(std::io::Error::other(e)))?;
        json.push('\n');

        std::fs::write(&self.registry_path, json).map_err(registry_io)
    }

    /// Read all registry rows; an absent registry is an empty one
    pub fn load_registry(&self) -> Result<Vec<RegistryEntry>, AuditError> {
        let contents = match std::fs::read_to_string(&self.registry_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(AuditError::RecordIo {
                    path: self.registry_path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents).map_err(|e| AuditError::RecordIo {
            path: self.registry_path.clone(),
            source: std::io::Error::other(e),
        })
    }

    pub fn registry_path(&self) -> &Path {
        &self.registry_path
    }
}
