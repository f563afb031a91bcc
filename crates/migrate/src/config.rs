//! Configuration file and local filesystem layout.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Host value of the default config; means "not configured yet".
pub const PLACEHOLDER_HOST: &str = "user@example.com";

/// Written by `ccm config --init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"[target]
type = "ssh"
host = "user@example.com"
path = "~/.claude"
# port = 22
# identity_file = "~/.ssh/id_ed25519"

[include]
settings_local = false
mcp_config = true

[backup]
path = "~/backups/claude"
"#;

/// Fixed local locations, threaded explicitly so tests can point the engine
/// at temporary directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// The configuration directory being migrated (`~/.claude`).
    pub source_root: PathBuf,
    /// External file holding MCP server definitions (`~/.claude.json`).
    pub secrets_file: PathBuf,
    /// This tool's own config file.
    pub config_file: PathBuf,
}

impl Layout {
    pub fn from_home(home: &Path) -> Self {
        Self {
            source_root: home.join(".claude"),
            secrets_file: home.join(".claude.json"),
            config_file: home
                .join(".config")
                .join("claude-code-migrate")
                .join("config.toml"),
        }
    }

    /// Layout for the current user.
    pub fn detect() -> Result<Self> {
        let home = dirs::home_dir().context("Cannot determine home directory")?;
        Ok(Self::from_home(&home))
    }
}

fn default_target_type() -> String {
    "ssh".to_string()
}

fn default_host() -> String {
    PLACEHOLDER_HOST.to_string()
}

fn default_target_path() -> String {
    "~/.claude".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_mcp_config() -> bool {
    true
}

fn default_backup_path() -> String {
    "~/backups/claude".to_string()
}

/// `[target]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSection {
    #[serde(rename = "type", default = "default_target_type")]
    pub kind: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_target_path")]
    pub path: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
}

impl Default for TargetSection {
    fn default() -> Self {
        Self {
            kind: default_target_type(),
            host: default_host(),
            path: default_target_path(),
            port: default_port(),
            identity_file: None,
        }
    }
}

/// `[include]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeSection {
    #[serde(default)]
    pub settings_local: bool,
    #[serde(default = "default_mcp_config")]
    pub mcp_config: bool,
}

impl Default for IncludeSection {
    fn default() -> Self {
        Self {
            settings_local: false,
            mcp_config: default_mcp_config(),
        }
    }
}

/// `[backup]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSection {
    #[serde(default = "default_backup_path")]
    pub path: String,
}

impl Default for BackupSection {
    fn default() -> Self {
        Self {
            path: default_backup_path(),
        }
    }
}

/// Parsed `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub target: TargetSection,
    #[serde(default)]
    pub include: IncludeSection,
    #[serde(default)]
    pub backup: BackupSection,
}

impl Config {
    /// Parse config from TOML content.
    pub fn parse(content: &str) -> ccm_common::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load the config file, falling back to defaults when it is missing or
    /// cannot be parsed.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!("Failed to read config at {:?}, using defaults: {}", path, e);
                return Self::default();
            }
        };

        match Self::parse(&content) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to parse config at {:?}, using defaults: {}", path, e);
                Self::default()
            }
        }
    }

    /// Write the default config. Returns `false` if a file already exists.
    pub fn init(path: &Path) -> Result<bool> {
        if path.exists() {
            warn!("Config already exists at {:?}", path);
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        std::fs::write(path, DEFAULT_CONFIG_TOML)
            .with_context(|| format!("Failed to write {:?}", path))?;
        Ok(true)
    }

    /// Whether the effective target host is still the unconfigured placeholder.
    pub fn target_is_placeholder(&self) -> bool {
        self.target.host == PLACEHOLDER_HOST
    }
}
