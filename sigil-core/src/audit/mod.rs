//! Sigil Audit System - Tamper-evident attestations for software artifacts
//!
//! This module produces and consumes audit records: a file is hashed, the
//! hash and metadata are wrapped in a canonical manifest, the manifest is
//! signed with an asymmetric key, and the pairing of manifest and signature
//! becomes the durable unit of trust.
//!
//! Design Principles:
//! - Canonical bytes are law - signer and verifier serialize the manifest
//!   identically, or nothing matches
//! - No silent degradation - every failure mode has its own error variant
//! - No internal retries - transient-failure policy belongs to the operator
//! - Industry standard crypto - SHA-256 digests, detached armored signatures

pub mod error;
pub mod hasher;
pub mod manifest;
pub mod record;
pub mod verifier;

pub use error::AuditError;
pub use hasher::Digest;
pub use manifest::Manifest;
pub use record::{AuditRecord, RecordStore};
pub use verifier::{Verification, Verifier};

/// Manifest schema version stamped into every new manifest
pub const SCHEMA_VERSION: &str = "1.0";

/// Default extension appended to the artifact path for the record file
pub const RECORD_EXTENSION: &str = "sigil";
