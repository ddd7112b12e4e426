//! Audit manifest - the canonical metadata record that gets signed
//!
//! A manifest binds an artifact digest to component metadata and a capture
//! timestamp. For signing and verification it is serialized in one canonical
//! form: object keys in lexicographic order, no insignificant whitespace.
//! Signer and verifier both derive that byte sequence from the manifest
//! value, never from any on-disk rendering of it.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::hasher::Digest;
use crate::audit::SCHEMA_VERSION;

/// Canonical audit claim for one artifact
///
/// Field declarations are kept in lexicographic order to mirror the
/// canonical serialization; the canonical bytes are still produced through
/// a sorted-key JSON value rather than relying on declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub auditor: String,
    pub component: String,
    pub digest: Digest,
    pub schema_version: String,
    /// Captured once at build time and never reformatted: re-rendering the
    /// timestamp (even to an equivalent instant) would change the signed bytes.
    pub timestamp: String,
    pub version: String,
}

impl Manifest {
    /// Build a manifest for an artifact, stamping the current UTC time
    pub fn build(component: &str, version: &str, digest: Digest, auditor: &str) -> Self {
        Manifest {
            auditor: auditor.to_string(),
            component: component.to_string(),
            digest,
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            version: version.to_string(),
        }
    }

    /// The exact byte sequence that gets signed and verified
    ///
    /// serde_json's default object representation is a BTreeMap, so routing
    /// the manifest through a JSON value emits keys in lexicographic order;
    /// compact serialization adds no whitespace.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let value =
            serde_json::to_value(self).expect("manifest is plain strings and always serializes");
        serde_json::to_vec(&value).expect("JSON value always serializes")
    }

    /// Structural checks applied when a manifest arrives from disk
    ///
    /// Digest shape is already enforced during deserialization; this covers
    /// the remaining field-level requirements.
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(format!(
                "unsupported schema_version '{}' (expected '{}')",
                self.schema_version, SCHEMA_VERSION
            ));
        }
        if self.component.is_empty() {
            return Err("component must not be empty".to_string());
        }
        if self.version.is_empty() {
            return Err("version must not be empty".to_string());
        }
        if self.auditor.is_empty() {
            return Err("auditor must not be empty".to_string());
        }
        if chrono::DateTime::parse_from_rfc3339(&self.timestamp).is_err() {
            return Err(format!(
                "timestamp '{}' is not a valid RFC3339 datetime",
                self.timestamp
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hello_digest() -> Digest {
        Digest::parse("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824").unwrap()
    }

    fn sample_manifest() -> Manifest {
        Manifest {
            auditor: "sigil".to_string(),
            component: "billing-service".to_string(),
            digest: hello_digest(),
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp: "2026-01-15T12:00:00Z".to_string(),
            version: "1.0.0".to_string(),
        }
    }

    #[test]
    fn test_canonical_bytes_pinned() {
        let canonical = String::from_utf8(sample_manifest().canonical_bytes()).unwrap();
        insta::assert_snapshot!(
            canonical,
            @r#"{"auditor":"sigil","component":"billing-service","digest":"2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824","schema_version":"1.0","timestamp":"2026-01-15T12:00:00Z","version":"1.0.0"}"#
        );
    }

    #[test]
    fn test_canonical_bytes_sorted_and_compact() {
        let canonical = String::from_utf8(sample_manifest().canonical_bytes()).unwrap();

        // No padding anywhere
        assert!(!canonical.contains(": "));
        assert!(!canonical.contains(", "));

        // Keys appear in lexicographic order
        let positions: Vec<usize> = [
            "\"auditor\"",
            "\"component\"",
            "\"digest\"",
            "\"schema_version\"",
            "\"timestamp\"",
            "\"version\"",
        ]
        .iter()
        .map(|key| canonical.find(key).expect("all keys present"))
        .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }

    #[test]
    fn test_canonical_bytes_independent_of_input_order() {
        // The same manifest arriving with scrambled key order must
        // canonicalize to the same bytes as one built in code.
        let scrambled = r#"{
            "version": "1.0.0",
            "timestamp": "2026-01-15T12:00:00Z",
            "schema_version": "1.0",
            "digest": "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
            "component": "billing-service",
            "auditor": "sigil"
        }"#;
        let parsed: Manifest = serde_json::from_str(scrambled).unwrap();

        assert_eq!(parsed.canonical_bytes(), sample_manifest().canonical_bytes());
    }

    #[test]
    fn test_canonical_bytes_survive_round_trip() {
        let original = sample_manifest();
        let rendered = serde_json::to_string_pretty(&original).unwrap();
        let reloaded: Manifest = serde_json::from_str(&rendered).unwrap();

        assert_eq!(original.canonical_bytes(), reloaded.canonical_bytes());
    }

    #[test]
    fn test_build_stamps_schema_and_timestamp() {
        let manifest = Manifest::build("api-gateway", "2.3.1", hello_digest(), "sigil");

        assert_eq!(manifest.schema_version, SCHEMA_VERSION);
        assert_eq!(manifest.component, "api-gateway");
        assert!(manifest.timestamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&manifest.timestamp).is_ok());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_schema_version() {
        let mut manifest = sample_manifest();
        manifest.schema_version = "2.0".to_string();

        let err = manifest.validate().unwrap_err();
        assert!(err.contains("unsupported schema_version"));
    }

    #[test]
    fn test_validate_rejects_empty_component() {
        let mut manifest = sample_manifest();
        manifest.component = String::new();

        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_timestamp() {
        let mut manifest = sample_manifest();
        manifest.timestamp = "yesterday at noon".to_string();

        let err = manifest.validate().unwrap_err();
        assert!(err.contains("RFC3339"));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let with_extra = r#"{
            "auditor": "sigil",
            "component": "billing-service",
            "digest": "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
            "schema_version": "1.0",
            "status": "VERIFIED",
            "timestamp": "2026-01-15T12:00:00Z",
            "version": "1.0.0"
        }"#;

        assert!(serde_json::from_str::<Manifest>(with_extra).is_err());
    }
}
