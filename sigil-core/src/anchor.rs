//! Ledger anchoring client
//!
//! Runs the statically configured ledger client command once per anchor
//! attempt and waits for it to report a confirmed transaction. Anchoring
//! strengthens a record after the fact; it never gates one. One attempt per
//! call: resubmission is an operator decision, surfaced as `sigil anchor`.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::audit::error::AuditError;
use crate::audit::manifest::Manifest;
use crate::audit::record::AuditRecord;
use crate::config::LedgerSettings;

/// Environment variables handed to the ledger client subprocess
pub const CONTRACT_ENV: &str = "SIGIL_LEDGER_CONTRACT";
pub const RPC_URL_ENV: &str = "SIGIL_LEDGER_RPC_URL";
pub const KEY_FILE_ENV: &str = "SIGIL_LEDGER_KEY_FILE";

/// Proof that the ledger accepted an anchor transaction
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorReceipt {
    pub transaction_id: String,
}

/// Client for the external ledger command
#[derive(Debug, Clone)]
pub struct AnchorClient {
    settings: LedgerSettings,
}

impl AnchorClient {
    pub fn new(settings: LedgerSettings) -> Self {
        AnchorClient { settings }
    }

    /// Whether a ledger client command has been configured at all
    pub fn is_configured(&self) -> bool {
        !self.settings.command.trim().is_empty()
    }

    /// Escape newlines so a multi-line armor block travels as one argv entry
    fn normalize_signature(signature: &str) -> String {
        signature.replace('\n', "\\n")
    }

    /// Anchor a manifest and its signature in a single ledger transaction
    pub async fn anchor(
        &self,
        manifest: &Manifest,
        signature: &str,
    ) -> Result<AnchorReceipt, AuditError> {
        if !self.is_configured() {
            return Err(AuditError::Config {
                reason: "ledger.command is not configured\n\
                         Set it in sigil.yml or via SIGIL_LEDGER_COMMAND"
                    .to_string(),
            });
        }

        let argv =
            shell_words::split(&self.settings.command).map_err(|e| AuditError::AnchorFailure {
                detail: format!(
                    "ledger command {:?} could not be tokenized: {e}",
                    self.settings.command
                ),
            })?;
        if argv.is_empty() {
            return Err(AuditError::AnchorFailure {
                detail: "ledger command is empty".to_string(),
            });
        }

        debug!(
            "Anchoring {} v{} via {:?}",
            manifest.component, manifest.version, argv[0]
        );

        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]);
        command.arg(&manifest.component);
        command.arg(&manifest.version);
        command.arg(manifest.digest.prefixed());
        command.arg(Self::normalize_signature(signature));

        if !self.settings.contract_address.trim().is_empty() {
            command.env(CONTRACT_ENV, &self.settings.contract_address);
        }
        if !self.settings.rpc_url.trim().is_empty() {
            command.env(RPC_URL_ENV, &self.settings.rpc_url);
        }
        if let Some(key_file) = &self.settings.key_file {
            command.env(KEY_FILE_ENV, key_file);
        }

        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AuditError::AnchorFailure {
                detail: format!(
                    "failed to spawn ledger command {:?}: {e}",
                    self.settings.command
                ),
            })?;

        let output = tokio::time::timeout(
            Duration::from_secs(self.settings.timeout_seconds),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| AuditError::AnchorFailure {
            detail: format!(
                "ledger client timed out after {}s waiting for confirmation",
                self.settings.timeout_seconds
            ),
        })?
        .map_err(|e| AuditError::AnchorFailure {
            detail: format!("failed to collect ledger client output: {e}"),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuditError::AnchorFailure {
                detail: format!(
                    "ledger client exited with {}: {}",
                    output.status,
                    stderr.trim()
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let transaction_id =
            Self::parse_transaction_id(&stdout).ok_or_else(|| AuditError::AnchorFailure {
                detail: "ledger client reported no transaction id".to_string(),
            })?;

        info!(
            "Anchored {} v{} in transaction {}",
            manifest.component, manifest.version, transaction_id
        );
        Ok(AnchorReceipt { transaction_id })
    }

    /// Convenience for re-anchoring an already stored record
    pub async fn anchor_record(&self, record: &AuditRecord) -> Result<AnchorReceipt, AuditError> {
        self.anchor(&record.manifest, &record.signature).await
    }

    /// The transaction id is the first `tx:` line; clients that print bare
    /// ids are accommodated by taking the last non-empty line instead
    fn parse_transaction_id(stdout: &str) -> Option<String> {
        for line in stdout.lines() {
            if let Some(id) = line.trim().strip_prefix("tx:") {
                let id = id.trim();
                if !id.is_empty() {
                    return Some(id.to_string());
                }
            }
        }

        stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .next_back()
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::hasher::Digest;
    use pretty_assertions::assert_eq;

    fn sample_manifest() -> Manifest {
        Manifest::build(
            "billing-service",
            "1.0.0",
            Digest::parse("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
                .unwrap(),
            "sigil",
        )
    }

    fn client_with_command(command: &str) -> AnchorClient {
        AnchorClient::new(LedgerSettings {
            enabled: true,
            command: command.to_string(),
            contract_address: "0x1aF990C1Fc86F5E761043D1C74c1cC4e1187946D".to_string(),
            rpc_url: "https://rpc.example.com".to_string(),
            key_file: None,
            timeout_seconds: 5,
        })
    }

    #[test]
    fn test_parse_transaction_id() {
        assert_eq!(
            AnchorClient::parse_transaction_id("Anchoring...\ntx:0xdeadbeef\nconfirmed\n"),
            Some("0xdeadbeef".to_string())
        );
        assert_eq!(
            AnchorClient::parse_transaction_id("Transaction sent\n0xabc123\n\n"),
            Some("0xabc123".to_string())
        );
        assert_eq!(AnchorClient::parse_transaction_id("\n  \n"), None);
    }

    #[test]
    fn test_normalize_signature_escapes_newlines() {
        let armored = "-----BEGIN PGP SIGNATURE-----\nabc\n-----END PGP SIGNATURE-----";
        assert_eq!(
            AnchorClient::normalize_signature(armored),
            "-----BEGIN PGP SIGNATURE-----\\nabc\\n-----END PGP SIGNATURE-----"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_client_is_a_config_error() {
        let client = client_with_command("   ");
        let result = client.anchor(&sample_manifest(), "sig").await;
        assert!(matches!(result, Err(AuditError::Config { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_anchor_reports_transaction() {
        let client = client_with_command("sh -c 'echo \"Anchoring audit...\"; echo \"tx:0xfeed\"'");
        let receipt = client.anchor(&sample_manifest(), "sig").await.unwrap();
        assert_eq!(receipt.transaction_id, "0xfeed");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_anchor_passes_argv_in_order() {
        // Positional params of `sh -c` start at $0 for appended argv
        let client = client_with_command(r#"sh -c 'printf "tx:%s|%s|%s\n" "$0" "$1" "$2"'"#);
        let receipt = client.anchor(&sample_manifest(), "sig").await.unwrap();
        assert_eq!(
            receipt.transaction_id,
            "billing-service|1.0.0|0x2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_anchor_sends_escaped_signature() {
        let client = client_with_command(r#"sh -c 'printf "tx:%s\n" "$3"'"#);
        let receipt = client
            .anchor(&sample_manifest(), "line one\nline two")
            .await
            .unwrap();
        assert_eq!(receipt.transaction_id, "line one\\nline two");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_anchor_exports_ledger_environment() {
        let client = client_with_command("sh -c 'echo \"tx:$SIGIL_LEDGER_CONTRACT\"'");
        let receipt = client.anchor(&sample_manifest(), "sig").await.unwrap();
        assert_eq!(
            receipt.transaction_id,
            "0x1aF990C1Fc86F5E761043D1C74c1cC4e1187946D"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_anchor_failure_carries_stderr() {
        let client = client_with_command("sh -c 'echo \"insufficient funds\" >&2; exit 3'");
        let result = client.anchor(&sample_manifest(), "sig").await;
        match result {
            Err(AuditError::AnchorFailure { detail }) => {
                assert!(
                    detail.contains("insufficient funds"),
                    "unexpected detail: {detail}"
                );
            }
            other => panic!("expected AnchorFailure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_anchor_requires_some_output() {
        let client = client_with_command("sh -c 'exit 0'");
        let result = client.anchor(&sample_manifest(), "sig").await;
        assert!(matches!(result, Err(AuditError::AnchorFailure { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_anchor_times_out() {
        let client = AnchorClient::new(LedgerSettings {
            enabled: true,
            command: "sh -c 'sleep 5'".to_string(),
            contract_address: String::new(),
            rpc_url: String::new(),
            key_file: None,
            timeout_seconds: 1,
        });

        let result = client.anchor(&sample_manifest(), "sig").await;
        match result {
            Err(AuditError::AnchorFailure { detail }) => {
                assert!(detail.contains("timed out"), "unexpected detail: {detail}");
            }
            other => panic!("expected AnchorFailure, got {other:?}"),
        }
    }
}
