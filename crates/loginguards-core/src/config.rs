use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

pub const DEFAULT_API_BASE_URL: &str = "https://api.loginguards.com/v1";
pub const DEFAULT_DECISION_TIMEOUT: Duration = Duration::from_millis(1500);
pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_secs(30);
const MIN_DECISION_TIMEOUT: Duration = Duration::from_millis(100);
const MAX_DECISION_TIMEOUT: Duration = Duration::from_secs(10);

/// What to answer when a decision cannot be completed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FailMode {
    FailOpen,
    #[default]
    FailClosed,
}

impl FailMode {
    pub fn allows_on_failure(self) -> bool {
        matches!(self, FailMode::FailOpen)
    }
}

impl FromStr for FailMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "fail-open" | "open" => Ok(FailMode::FailOpen),
            "fail-closed" | "closed" => Ok(FailMode::FailClosed),
            _ => Err(format!("unknown fail mode: {value}")),
        }
    }
}

impl fmt::Display for FailMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            FailMode::FailOpen => "fail-open",
            FailMode::FailClosed => "fail-closed",
        };
        write!(f, "{value}")
    }
}

/// Effective policy settings, with every default applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfiguration {
    pub fail_mode: FailMode,
    pub pipe_endpoint: String,
    pub decision_timeout: Duration,
    pub log_username: bool,
    pub api_base_url: String,
    pub reload_interval: Duration,
}

impl Default for PolicyConfiguration {
    fn default() -> Self {
        Self {
            fail_mode: FailMode::default(),
            pipe_endpoint: default_pipe_endpoint(),
            decision_timeout: DEFAULT_DECISION_TIMEOUT,
            log_username: false,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            reload_interval: DEFAULT_RELOAD_INTERVAL,
        }
    }
}

impl PolicyConfiguration {
    pub fn from_document(document: &ConfigDocument) -> Self {
        let defaults = Self::default();
        let decision_timeout = document
            .decision_timeout_ms
            .map(Duration::from_millis)
            .map_or(defaults.decision_timeout, clamp_decision_timeout);
        Self {
            fail_mode: document.fail_mode.unwrap_or(defaults.fail_mode),
            pipe_endpoint: document
                .pipe_endpoint
                .clone()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(defaults.pipe_endpoint),
            decision_timeout,
            log_username: document.log_username.unwrap_or(defaults.log_username),
            api_base_url: document
                .api_base_url
                .clone()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(defaults.api_base_url),
            reload_interval: document
                .reload_interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.reload_interval),
        }
    }

    /// Writes the policy fields into `document`, leaving the credential and
    /// unknown keys untouched.
    pub fn apply_to(&self, document: &mut ConfigDocument) {
        document.fail_mode = Some(self.fail_mode);
        document.pipe_endpoint = Some(self.pipe_endpoint.clone());
        let timeout = clamp_decision_timeout(self.decision_timeout);
        document.decision_timeout_ms = Some(timeout.as_millis() as u64);
        document.log_username = Some(self.log_username);
        document.api_base_url = Some(self.api_base_url.clone());
        document.reload_interval_secs = Some(self.reload_interval.as_secs());
    }
}

fn clamp_decision_timeout(timeout: Duration) -> Duration {
    timeout.clamp(MIN_DECISION_TIMEOUT, MAX_DECISION_TIMEOUT)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProtectionScheme {
    /// DPAPI with machine scope.
    DpapiMachine,
    /// AES-256-GCM under a key file in the machine configuration directory.
    MachineKey,
    /// `SS:`-prefixed value written by earlier installer releases.
    LegacySecureString,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ProtectionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            ProtectionScheme::DpapiMachine => "dpapi-machine",
            ProtectionScheme::MachineKey => "machine-key",
            ProtectionScheme::LegacySecureString => "legacy-secure-string",
            ProtectionScheme::Unknown => "unknown",
        };
        write!(f, "{value}")
    }
}

/// The at-rest credential: base64 ciphertext plus the tag of the scheme that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BlobRepr")]
pub struct EncryptedBlob {
    pub scheme: ProtectionScheme,
    pub data: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BlobRepr {
    Tagged { scheme: ProtectionScheme, data: String },
    Legacy(String),
}

impl From<BlobRepr> for EncryptedBlob {
    fn from(repr: BlobRepr) -> Self {
        match repr {
            BlobRepr::Tagged { scheme, data } => Self { scheme, data },
            BlobRepr::Legacy(value) => match value.strip_prefix("SS:") {
                Some(rest) => Self {
                    scheme: ProtectionScheme::LegacySecureString,
                    data: rest.to_string(),
                },
                None => Self {
                    scheme: ProtectionScheme::DpapiMachine,
                    data: value,
                },
            },
        }
    }
}

/// The on-disk JSON configuration document.
///
/// Every field is optional so that a partially written or older document
/// still loads; keys this version does not know are kept in `extra` and
/// written back unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_mode: Option<FailMode>,
    #[serde(default, alias = "pipeName", skip_serializing_if = "Option::is_none")]
    pub pipe_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_username: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reload_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_enc: Option<EncryptedBlob>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConfigDocument {
    pub fn from_json_str(contents: &str) -> Result<Self, CoreError> {
        serde_json::from_str(contents)
            .map_err(|err| CoreError::InvalidConfig(format!("parse config JSON: {err}")))
    }

    pub fn to_json_string(&self) -> Result<String, CoreError> {
        serde_json::to_string_pretty(self)
            .map_err(|err| CoreError::InvalidConfig(format!("render config JSON: {err}")))
    }

    /// Loads the document; a missing file is an empty document.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        match fs::read_to_string(path) {
            Ok(contents) if contents.trim().is_empty() => Ok(Self::default()),
            Ok(contents) => Self::from_json_str(&contents),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(CoreError::io(path, err)),
        }
    }

    /// Writes the document through a sibling temp file and a rename, so a
    /// reader never observes a half-written file.
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| CoreError::io(parent, err))?;
        }
        let contents = self.to_json_string()?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, contents).map_err(|err| CoreError::io(&staging, err))?;
        fs::rename(&staging, path).map_err(|err| CoreError::io(path, err))?;
        Ok(())
    }

    /// Read-modify-write of the document at `path`.
    pub fn update(path: &Path, edit: impl FnOnce(&mut ConfigDocument)) -> Result<Self, CoreError> {
        let mut document = Self::load(path)?;
        edit(&mut document);
        document.save(path)?;
        Ok(document)
    }
}

/// Machine-wide, non-roaming locations shared by the installer, the CLI and the service.
#[derive(Debug, Clone)]
pub struct MachinePaths {
    pub root_dir: PathBuf,
    pub config_path: PathBuf,
    pub machine_key_path: PathBuf,
    pub log_dir: PathBuf,
}

impl MachinePaths {
    pub fn resolve() -> Result<Self, CoreError> {
        if let Ok(home) = std::env::var("LOGINGUARDS_HOME") {
            return Ok(Self::under(PathBuf::from(home)));
        }
        if let Ok(program_data) = std::env::var("PROGRAMDATA") {
            return Ok(Self::under(PathBuf::from(program_data).join("LoginGuards")));
        }
        let base = BaseDirs::new().ok_or_else(|| {
            CoreError::InvalidConfig("unable to determine a machine data directory".to_string())
        })?;
        Ok(Self::under(base.data_local_dir().join("LoginGuards")))
    }

    pub fn under(root_dir: PathBuf) -> Self {
        Self {
            config_path: root_dir.join("config.json"),
            machine_key_path: root_dir.join("machine.key"),
            log_dir: root_dir.join("logs"),
            root_dir,
        }
    }
}

pub fn default_pipe_endpoint() -> String {
    if cfg!(windows) {
        return r"\\.\pipe\LoginGuardsPwdFilter".to_string();
    }
    if let Ok(runtime) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime)
            .join("loginguards.sock")
            .display()
            .to_string();
    }
    "/tmp/loginguards.sock".to_string()
}
