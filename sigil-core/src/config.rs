//! Configuration loading and discovery
//!
//! One explicit `SigilConfig` is threaded into every component at
//! construction; nothing reads mutable global state after startup. Values
//! merge in precedence order:
//! 1. Built-in defaults
//! 2. `sigil.yml` (from `--config`, `SIGIL_CONFIG`, `./sigil.yml`, or the
//!    platform config directory)
//! 3. `SIGIL_*` environment variables
//! 4. CLI flags (applied by the caller)

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CONFIG_ENV: &str = "SIGIL_CONFIG";
pub const CONFIG_FILE_NAME: &str = "sigil.yml";

static IDENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\r\n]+$").expect("identity regex is valid"));

/// Signing backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerSettings {
    /// Backend selection: "gpg" or "hmac"
    #[serde(default = "default_signer_backend")]
    pub backend: String,

    /// Identity handed to the backend (`gpg --local-user`)
    #[serde(default)]
    pub identity: String,

    /// Command line for the signing subprocess
    #[serde(default = "default_signer_command")]
    pub command: String,

    #[serde(default = "default_signer_timeout")]
    pub timeout_seconds: u64,

    /// Key file for the hmac backend
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

impl Default for SignerSettings {
    fn default() -> Self {
        SignerSettings {
            backend: default_signer_backend(),
            identity: String::new(),
            command: default_signer_command(),
            timeout_seconds: default_signer_timeout(),
            key_file: None,
        }
    }
}

/// Ledger anchoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Whether signing anchors records by default
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Ledger client command, run once per anchor attempt
    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub contract_address: String,

    #[serde(default)]
    pub rpc_url: String,

    /// Account key file handed to the ledger client, never read by sigil
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    #[serde(default = "default_ledger_timeout")]
    pub timeout_seconds: u64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            enabled: default_true(),
            command: String::new(),
            contract_address: String::new(),
            rpc_url: String::new(),
            key_file: None,
            timeout_seconds: default_ledger_timeout(),
        }
    }
}

/// Local registry bookkeeping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        RegistrySettings {
            path: default_registry_path(),
        }
    }
}

/// Community announcement configuration (used by the optional publisher)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherSettings {
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_community")]
    pub community: String,

    #[serde(default = "default_publish_timeout")]
    pub timeout_seconds: u64,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        PublisherSettings {
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            community: default_community(),
            timeout_seconds: default_publish_timeout(),
        }
    }
}

/// Top-level configuration for every sigil component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigilConfig {
    /// Auditor identity recorded in every manifest
    #[serde(default = "default_auditor")]
    pub auditor: String,

    /// Extension for audit record files, without the leading dot
    #[serde(default = "default_record_extension")]
    pub record_extension: String,

    #[serde(default)]
    pub signer: SignerSettings,

    #[serde(default)]
    pub ledger: LedgerSettings,

    #[serde(default)]
    pub registry: RegistrySettings,

    #[serde(default)]
    pub publisher: PublisherSettings,
}

impl Default for SigilConfig {
    fn default() -> Self {
        SigilConfig {
            auditor: default_auditor(),
            record_extension: default_record_extension(),
            signer: SignerSettings::default(),
            ledger: LedgerSettings::default(),
            registry: RegistrySettings::default(),
            publisher: PublisherSettings::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_signer_backend() -> String {
    "gpg".to_string()
}

fn default_signer_command() -> String {
    "gpg".to_string()
}

fn default_signer_timeout() -> u64 {
    30
}

fn default_ledger_timeout() -> u64 {
    60
}

fn default_registry_path() -> PathBuf {
    PathBuf::from(".sigil/registry.json")
}

fn default_auditor() -> String {
    "sigil".to_string()
}

fn default_record_extension() -> String {
    crate::audit::RECORD_EXTENSION.to_string()
}

fn default_api_base() -> String {
    "https://www.moltbook.com/api/v1".to_string()
}

fn default_api_key_env() -> String {
    "MOLTBOOK_API_KEY".to_string()
}

fn default_community() -> String {
    "general".to_string()
}

fn default_publish_timeout() -> u64 {
    30
}

impl SigilConfig {
    /// Load configuration with full precedence applied (defaults, then
    /// file, then environment). CLI flags are layered on by the caller.
    ///
    /// An explicit path (flag or `SIGIL_CONFIG`) must exist; the
    /// discovered locations are allowed to be absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match Self::resolve_file(explicit)? {
            Some(path) => Self::from_file(&path)?,
            None => {
                debug!("No configuration file found, using defaults");
                Self::default()
            }
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn resolve_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Config file does not exist: {}", path.display());
            }
            return Ok(Some(path.to_path_buf()));
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(env_path);
            if !path.exists() {
                anyhow::bail!(
                    "Config file from {CONFIG_ENV} does not exist: {}",
                    path.display()
                );
            }
            return Ok(Some(path));
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Ok(Some(local));
        }

        // Platform config directory, graceful absence
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "sigil") {
            let candidate = proj_dirs.config_dir().join(CONFIG_FILE_NAME);
            if candidate.exists() {
                return Ok(Some(candidate));
            }
        }

        Ok(None)
    }

    /// Overlay `SIGIL_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("SIGIL_AUDITOR") {
            self.auditor = v;
        }
        if let Ok(v) = std::env::var("SIGIL_SIGNER_BACKEND") {
            self.signer.backend = v;
        }
        if let Ok(v) = std::env::var("SIGIL_SIGNING_IDENTITY") {
            self.signer.identity = v;
        }
        if let Ok(v) = std::env::var("SIGIL_SIGNER_COMMAND") {
            self.signer.command = v;
        }
        if let Ok(v) = std::env::var("SIGIL_SIGNER_KEY_FILE") {
            self.signer.key_file = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("SIGIL_ANCHOR_ENABLED") {
            self.ledger.enabled = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("SIGIL_LEDGER_COMMAND") {
            self.ledger.command = v;
        }
        if let Ok(v) = std::env::var("SIGIL_LEDGER_CONTRACT") {
            self.ledger.contract_address = v;
        }
        if let Ok(v) = std::env::var("SIGIL_LEDGER_RPC_URL") {
            self.ledger.rpc_url = v;
        }
        if let Ok(v) = std::env::var("SIGIL_LEDGER_KEY_FILE") {
            self.ledger.key_file = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("SIGIL_REGISTRY_PATH") {
            self.registry.path = PathBuf::from(v);
        }
    }

    /// Shape checks that do not touch the filesystem
    pub fn validate(&self) -> Result<()> {
        match self.signer.backend.as_str() {
            "gpg" => {
                let identity = self.signer.identity.trim();
                if identity.is_empty() {
                    anyhow::bail!(
                        "signer.identity is required for the gpg backend\n\
                         Set it in sigil.yml or via SIGIL_SIGNING_IDENTITY"
                    );
                }
                if !IDENTITY_RE.is_match(identity) {
                    anyhow::bail!("signer.identity must be a single line");
                }
            }
            "hmac" => {
                if self.signer.key_file.is_none() {
                    anyhow::bail!(
                        "signer.key_file is required for the hmac backend\n\
                         Set it in sigil.yml or via SIGIL_SIGNER_KEY_FILE"
                    );
                }
            }
            other => {
                anyhow::bail!("Unknown signer backend: {other} (expected \"gpg\" or \"hmac\")");
            }
        }

        if self.record_extension.trim().is_empty() {
            anyhow::bail!("record_extension must not be empty");
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
