//! Audit system error types with clear, actionable messages

use std::path::PathBuf;
use thiserror::Error;

/// Audit system specific errors
#[derive(Error, Debug)]
pub enum AuditError {
    /// The artifact to hash or verify does not exist or cannot be read
    #[error("Failed to read artifact: {path}\n\nCheck that the file exists and is readable.")]
    ArtifactNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The audit record file does not exist or cannot be read
    #[error("Failed to read audit record: {path}\n\nCheck the path, or produce a record first with:\n  sigil sign <file> <component>")]
    RecordNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The audit record is structurally invalid
    #[error("Malformed audit record: {path}\n\nReason: {reason}\n\nThe record cannot be trusted in this state. Re-sign the artifact to produce a fresh record:\n  sigil sign <file> <component>")]
    MalformedRecord { path: PathBuf, reason: String },

    /// Artifact content changed since the record was signed
    #[error("Integrity violation detected!\n\nArtifact: {path}\nExpected digest: {expected}\nActual digest:   {actual}\n\nThe file content has changed since it was signed.\nIf the change is legitimate, re-sign the artifact; otherwise treat it as tampering.")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Signature does not match the canonical manifest bytes
    #[error("SECURITY ALERT: Signature verification failed!\n\nRecord: {path}\n{detail}\n\nThe signature does not match the manifest. This may indicate tampering with the\nrecord, or signing by a different key than the one used for verification.")]
    SignatureInvalid { path: PathBuf, detail: String },

    /// The external signing utility failed to produce or check a signature
    #[error("Signing utility failure: {detail}\n\nCheck that the signing tool is installed, the configured identity exists in its\nkeyring, and the key is usable non-interactively.")]
    SignFailure { detail: String },

    /// The ledger client failed to anchor the record
    #[error("Ledger anchoring failure: {detail}\n\nThe local audit record is still valid. To retry anchoring (a new transaction):\n  sigil anchor <record>")]
    AnchorFailure { detail: String },

    /// Failed to write or update local record artifacts
    #[error("Failed to write audit data: {path}")]
    RecordIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration is missing or inconsistent
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },
}

// Note: no From<AuditError> for anyhow::Error is implemented here because
// anyhow already has a blanket implementation for all Error types.

/// Log security-critical audit errors
impl AuditError {
    pub fn log_if_security_critical(&self) {
        match self {
            AuditError::HashMismatch { .. } | AuditError::SignatureInvalid { .. } => {
                tracing::error!(target: "security", "AUDIT VIOLATION: {}", self);
            }
            _ => {}
        }
    }
}
