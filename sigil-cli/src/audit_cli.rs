//! Audit CLI commands
//!
//! User-facing implementations of sign, verify, digest, anchor, history,
//! and init. Human-readable output goes to stdout; logs stay on stderr.

use anyhow::{Context, Result};
use sigil_core::anchor::AnchorClient;
use sigil_core::audit::error::AuditError;
use sigil_core::audit::hasher;
use sigil_core::audit::record::RecordStore;
use sigil_core::config::{SigilConfig, CONFIG_FILE_NAME};
use sigil_core::engine::{AnchorMode, AnchorOutcome, Engine};
use std::path::{Path, PathBuf};
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};
use tracing::debug;

/// Sign an artifact and report where the record landed
pub async fn sign_command(
    config: SigilConfig,
    file: &Path,
    component: &str,
    version: &str,
    no_anchor: bool,
    output: Option<&Path>,
) -> Result<()> {
    config.validate()?;
    let engine = Engine::new(config)?;

    println!(
        "🔏 Signing {} as {} v{}...",
        file.display(),
        component,
        version
    );

    let mode = if no_anchor {
        AnchorMode::Disabled
    } else {
        AnchorMode::Auto
    };
    let outcome = match output {
        Some(path) => {
            engine
                .sign_artifact_to(file, component, version, mode, path)
                .await?
        }
        None => engine.sign_artifact(file, component, version, mode).await?,
    };

    println!("✅ Audit record written: {}", outcome.record_path.display());
    println!("   SHA-256:   {}", outcome.record.manifest.digest);
    println!("   Signed by: {}", engine.signer_description());

    match &outcome.anchor {
        AnchorOutcome::Confirmed { transaction_id } => {
            println!("⛓️  Anchored in transaction {transaction_id}");
        }
        AnchorOutcome::Disabled => {}
        AnchorOutcome::Failed { reason } => {
            println!("⚠️  Anchoring failed: {reason}");
            println!("   The local record is still valid. To retry:");
            println!("   sigil anchor {}", outcome.record_path.display());
        }
    }

    Ok(())
}

/// Check an artifact against its audit record
///
/// Exits non-zero on any verification failure so scripts can gate on it.
pub async fn verify_command(
    config: SigilConfig,
    file: &Path,
    record: Option<&Path>,
    json: bool,
) -> Result<()> {
    let engine = Engine::new(config)?;
    let record_path = match record {
        Some(path) => path.to_path_buf(),
        None => {
            let default = engine.store().default_record_path(file);
            debug!("No record path given, using {}", default.display());
            default
        }
    };

    if !json {
        println!(
            "🔍 Verifying {} against {}...",
            file.display(),
            record_path.display()
        );
    }

    match engine.verify_artifact(file, &record_path).await {
        Ok(verification) => {
            if json {
                let mut value = serde_json::to_value(&verification)?;
                if let Some(object) = value.as_object_mut() {
                    object.insert(
                        "status".to_string(),
                        serde_json::Value::String("passed".to_string()),
                    );
                }
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("✅ Verification PASSED");
                println!(
                    "   Component: {} v{}",
                    verification.component, verification.version
                );
                println!("   Auditor:   {}", verification.auditor);
                println!("   Signed at: {}", verification.timestamp);
                println!("   SHA-256:   {}", verification.digest);
            }
            Ok(())
        }
        Err(e) => {
            if json {
                let failure = serde_json::json!({
                    "status": "failed",
                    "kind": error_kind(&e),
                    "error": e.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&failure)?);
            } else {
                eprintln!("❌ Verification FAILED\n");
                eprintln!("{e}");
            }
            std::process::exit(1);
        }
    }
}

/// Stable kind strings for machine-readable output
fn error_kind(error: &AuditError) -> &'static str {
    match error {
        AuditError::ArtifactNotFound { .. } => "artifact-not-found",
        AuditError::RecordNotFound { .. } => "record-not-found",
        AuditError::MalformedRecord { .. } => "malformed-record",
        AuditError::HashMismatch { .. } => "hash-mismatch",
        AuditError::SignatureInvalid { .. } => "signature-invalid",
        AuditError::SignFailure { .. } => "sign-failure",
        AuditError::AnchorFailure { .. } => "anchor-failure",
        AuditError::RecordIo { .. } => "record-io",
        AuditError::Config { .. } => "config",
    }
}

/// Hash files without signing, in `sha256sum` output shape
pub async fn digest_command(files: &[PathBuf]) -> Result<()> {
    debug!("Hashing {} files", files.len());
    let results = hasher::hash_files(files).await;

    let mut failures = 0;
    for (path, result) in &results {
        match result {
            Ok(digest) => println!("{}  {}", digest, path.display()),
            Err(e) => {
                eprintln!("❌ {e}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Anchor a stored record in a fresh ledger transaction
///
/// Requires no signer configuration; only the ledger settings are used.
pub async fn anchor_command(config: SigilConfig, record_path: &Path) -> Result<()> {
    let store = RecordStore::new(&config.record_extension, &config.registry.path);
    let client = AnchorClient::new(config.ledger.clone());

    let record = store.load(record_path)?;
    println!(
        "⛓️  Anchoring {} v{}...",
        record.manifest.component, record.manifest.version
    );

    let receipt = client.anchor_record(&record).await?;
    println!("✅ Anchored in transaction {}", receipt.transaction_id);
    Ok(())
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "SHA-256")]
    digest: String,
    #[tabled(rename = "Anchored")]
    anchored: String,
}

/// List past signing operations from the local registry
pub fn history_command(config: SigilConfig, registry: Option<&Path>) -> Result<()> {
    let registry_path = registry.unwrap_or(&config.registry.path);
    let store = RecordStore::new(&config.record_extension, registry_path);

    let entries = store.load_registry()?;
    if entries.is_empty() {
        println!(
            "📋 No signing operations recorded in {}",
            registry_path.display()
        );
        return Ok(());
    }

    let rows: Vec<HistoryRow> = entries
        .iter()
        .map(|entry| HistoryRow {
            created: entry.created_at.clone(),
            component: entry.component.clone(),
            version: entry.version.clone(),
            digest: short_digest(&entry.digest),
            anchored: entry
                .anchored_tx
                .clone()
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string();

    println!("{} signing operations\n", entries.len());
    println!("{table}");
    Ok(())
}

fn short_digest(digest: &str) -> String {
    if digest.len() > 16 {
        format!("{}...", &digest[..16])
    } else {
        digest.to_string()
    }
}

/// Write the configuration scaffold
pub fn init_command(global: bool, force: bool) -> Result<()> {
    let path = if global {
        global_config_path()?
    } else {
        PathBuf::from(CONFIG_FILE_NAME)
    };

    if path.exists() && !force {
        println!("❌ {} already exists", path.display());
        println!("   Re-run with --force to overwrite it");
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    std::fs::write(&path, CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("✅ Wrote {}", path.display());
    println!("   Set signer.identity to your signing key before running 'sigil sign'.");
    Ok(())
}

/// Machine-wide configuration location, matching discovery order
fn global_config_path() -> Result<PathBuf> {
    let config_dir = if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "sigil") {
        proj_dirs.config_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .context("Could not determine home directory")?
            .join(".config")
            .join("sigil")
    };
    Ok(config_dir.join(CONFIG_FILE_NAME))
}

/// Announce a completed audit to the community site
#[cfg(feature = "publish")]
pub async fn publish_command(
    config: SigilConfig,
    record_path: &Path,
    title: Option<&str>,
    community: Option<&str>,
) -> Result<()> {
    use sigil_core::publisher::Publisher;

    let store = RecordStore::new(&config.record_extension, &config.registry.path);
    let record = store.load(record_path)?;

    let publisher = Publisher::new(config.publisher)?;
    println!(
        "📣 Publishing audit announcement for {} v{}...",
        record.manifest.component, record.manifest.version
    );

    let post_id = publisher.publish_record(&record, title, community).await?;
    println!("✅ Published as post {post_id}");
    Ok(())
}

const CONFIG_TEMPLATE: &str = r#"# Sigil configuration
#
# Values here are overridden by SIGIL_* environment variables and CLI flags.

# Identity recorded in every manifest's "auditor" field
auditor: sigil

# Extension for audit record files (hello.txt -> hello.txt.sigil)
record_extension: sigil

signer:
  # "gpg" runs an external GPG binary; "hmac" signs with a local key file
  backend: gpg
  # Key identity handed to gpg --local-user (required before signing)
  identity: ""
  command: gpg
  timeout_seconds: 30
  # key_file: /path/to/sigil.key    # hmac backend only

ledger:
  # Anchor new records in the configured ledger after signing
  enabled: true
  # Client invoked as: <command> <component> <version> <0x-digest> <signature>
  command: ""
  contract_address: ""
  rpc_url: ""
  # key_file: /path/to/account.key
  timeout_seconds: 60

registry:
  # Local bookkeeping of every signing operation; never consulted for trust
  path: .sigil/registry.json

publisher:
  api_base: https://www.moltbook.com/api/v1
  api_key_env: MOLTBOOK_API_KEY
  community: general
  timeout_seconds: 30
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_template_parses_with_defaults() {
        let config: SigilConfig = serde_yaml_ng::from_str(CONFIG_TEMPLATE).unwrap();

        assert_eq!(config.auditor, "sigil");
        assert_eq!(config.record_extension, "sigil");
        assert_eq!(config.signer.backend, "gpg");
        assert!(config.ledger.enabled);
        assert_eq!(config.registry.path, PathBuf::from(".sigil/registry.json"));
    }

    #[test]
    fn test_config_template_needs_identity_before_signing() {
        // The scaffold ships without an identity; validation reports it
        // until the operator sets one
        let config: SigilConfig = serde_yaml_ng::from_str(CONFIG_TEMPLATE).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("signer.identity"));
    }

    #[test]
    fn test_error_kinds_are_stable() {
        let mismatch = AuditError::HashMismatch {
            path: PathBuf::from("artifact.bin"),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert_eq!(error_kind(&mismatch), "hash-mismatch");

        let invalid = AuditError::SignatureInvalid {
            path: PathBuf::from("artifact.bin.sigil"),
            detail: "rejected".to_string(),
        };
        assert_eq!(error_kind(&invalid), "signature-invalid");

        let missing = AuditError::RecordNotFound {
            path: PathBuf::from("artifact.bin.sigil"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(error_kind(&missing), "record-not-found");
    }

    #[test]
    fn test_short_digest_truncates() {
        let digest = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
        assert_eq!(short_digest(digest), "2cf24dba5fb0a30e...");
        assert_eq!(short_digest("abcd"), "abcd");
    }

    #[test]
    fn test_history_tolerates_missing_registry() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let registry = temp_dir.path().join("registry.json");

        let config = SigilConfig::default();
        history_command(config, Some(&registry)).unwrap();
    }
}
