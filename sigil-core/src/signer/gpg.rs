//! GPG signing backend
//!
//! Delegates to an external `gpg` binary. Signing streams the payload over
//! stdin and captures the armored detached signature from stdout, so the
//! payload never touches disk. Verification has no stdin-only mode in gpg,
//! so it round-trips through two scoped temp files that are removed on
//! every exit path.

use async_trait::async_trait;
use std::io::Write;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::audit::error::AuditError;
use crate::signer::Signer;

pub const DEFAULT_COMMAND: &str = "gpg";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Signer backed by an external GPG subprocess
#[derive(Debug, Clone)]
pub struct GpgSigner {
    command: String,
    identity: String,
    timeout_seconds: u64,
}

impl GpgSigner {
    pub fn new(command: &str, identity: &str, timeout_seconds: u64) -> Self {
        GpgSigner {
            command: command.to_string(),
            identity: identity.to_string(),
            timeout_seconds,
        }
    }

    /// Tokenize the configured command line into argv form
    fn base_argv(&self) -> Result<Vec<String>, AuditError> {
        let argv = shell_words::split(&self.command).map_err(|e| AuditError::SignFailure {
            detail: format!("signer command {:?} could not be tokenized: {e}", self.command),
        })?;
        if argv.is_empty() {
            return Err(AuditError::SignFailure {
                detail: "signer command is empty".to_string(),
            });
        }
        Ok(argv)
    }

    fn build_command(&self, extra_args: &[&str]) -> Result<Command, AuditError> {
        let argv = self.base_argv()?;
        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]);
        command.args(extra_args);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        Ok(command)
    }

    async fn wait_with_timeout(
        &self,
        child: tokio::process::Child,
    ) -> Result<std::process::Output, AuditError> {
        tokio::time::timeout(
            Duration::from_secs(self.timeout_seconds),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| AuditError::SignFailure {
            detail: format!(
                "signer subprocess timed out after {}s",
                self.timeout_seconds
            ),
        })?
        .map_err(|e| AuditError::SignFailure {
            detail: format!("failed to collect signer subprocess output: {e}"),
        })
    }
}

#[async_trait]
impl Signer for GpgSigner {
    async fn sign(&self, payload: &[u8]) -> Result<String, AuditError> {
        // Verification never needs an identity, so the requirement is
        // enforced here rather than at construction
        if self.identity.trim().is_empty() {
            return Err(AuditError::SignFailure {
                detail: "no signing identity configured\n\
                         Set signer.identity in sigil.yml or SIGIL_SIGNING_IDENTITY"
                    .to_string(),
            });
        }

        debug!(
            "Signing {} bytes with gpg identity '{}'",
            payload.len(),
            self.identity
        );

        let mut child = self
            .build_command(&[
                "--batch",
                "--yes",
                "--armor",
                "--local-user",
                &self.identity,
                "--output",
                "-",
                "--detach-sign",
            ])?
            .spawn()
            .map_err(|e| AuditError::SignFailure {
                detail: format!("failed to spawn signer command {:?}: {e}", self.command),
            })?;

        // A failed write shows up as a failed exit status or a signature
        // mismatch downstream, so the raw io error is not propagated here
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(payload).await;
            let _ = stdin.flush().await;
        }

        let output = self.wait_with_timeout(child).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuditError::SignFailure {
                detail: format!(
                    "signer exited with {}: {}",
                    output.status,
                    stderr.trim()
                ),
            });
        }

        let signature = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if signature.is_empty() {
            return Err(AuditError::SignFailure {
                detail: "signer produced no signature output".to_string(),
            });
        }

        Ok(signature)
    }

    async fn verify(&self, payload: &[u8], signature: &str) -> Result<bool, AuditError> {
        let scratch_io = |what: &str, e: std::io::Error| AuditError::SignFailure {
            detail: format!("failed to stage {what} for verification: {e}"),
        };

        // Both files live only for this call; drop removes them
        let mut signature_file =
            tempfile::NamedTempFile::new().map_err(|e| scratch_io("signature", e))?;
        signature_file
            .write_all(signature.as_bytes())
            .map_err(|e| scratch_io("signature", e))?;
        signature_file
            .flush()
            .map_err(|e| scratch_io("signature", e))?;

        let mut payload_file =
            tempfile::NamedTempFile::new().map_err(|e| scratch_io("payload", e))?;
        payload_file
            .write_all(payload)
            .map_err(|e| scratch_io("payload", e))?;
        payload_file.flush().map_err(|e| scratch_io("payload", e))?;

        let signature_path = signature_file.path().to_string_lossy().to_string();
        let payload_path = payload_file.path().to_string_lossy().to_string();

        let child = self
            .build_command(&["--batch", "--yes", "--verify", &signature_path, &payload_path])?
            .spawn()
            .map_err(|e| AuditError::SignFailure {
                detail: format!("failed to spawn signer command {:?}: {e}", self.command),
            })?;

        let output = self.wait_with_timeout(child).await?;

        if output.status.success() {
            debug!("gpg accepted signature for {} byte payload", payload.len());
            Ok(true)
        } else {
            // A clean non-zero exit is gpg's verdict, not a backend failure
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("gpg rejected signature: {}", stderr.trim());
            Ok(false)
        }
    }

    fn describe(&self) -> String {
        format!("gpg (identity: {})", self.identity)
    }
}
