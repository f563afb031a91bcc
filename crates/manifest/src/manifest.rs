//! The `.ccm-manifest.json` provenance record.

use crate::{FileEntry, FORMAT_VERSION};
use ccm_common::Timestamp;
use serde::{Deserialize, Serialize};

/// Where an archive was created. Probed by the caller; either field may
/// be unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub source_host: String,
    pub tool_version: Option<String>,
}

/// Provenance record bundled with every archive. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Archive format version.
    pub version: String,
    /// When the archive was created.
    pub timestamp: Timestamp,
    /// Host the configuration was collected on.
    pub source_host: String,
    /// `claude --version` on the source host, if it could be probed.
    pub claude_version: Option<String>,
    /// Entries in collection order. Content lives in the archive body.
    pub files: Vec<FileEntry>,
}

impl Manifest {
    pub fn new(provenance: &Provenance, files: &[FileEntry]) -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            timestamp: Timestamp::now(),
            source_host: provenance.source_host.clone(),
            claude_version: provenance.tool_version.clone(),
            files: files.to_vec(),
        }
    }

    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_null_version_is_kept() {
        let manifest = Manifest::new(
            &Provenance {
                source_host: "laptop".to_string(),
                tool_version: None,
            },
            &[FileEntry::file("/home/dev/.claude/CLAUDE.md", "CLAUDE.md")],
        );
        let value: serde_json::Value =
            serde_json::from_str(&manifest.to_pretty_json().unwrap()).unwrap();
        assert_eq!(value["version"], "1.0.0");
        assert_eq!(value["sourceHost"], "laptop");
        assert!(value["claudeVersion"].is_null());
        assert_eq!(value["files"][0]["relativePath"], "CLAUDE.md");
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_parse_back() {
        let manifest = Manifest::new(
            &Provenance {
                source_host: "laptop".to_string(),
                tool_version: Some("2.1.0".to_string()),
            },
            &[
                FileEntry::file("/a", "settings.json"),
                FileEntry::symlink("/b", "skills/x.md", "/b"),
            ],
        );
        let json = manifest.to_pretty_json().unwrap();
        let parsed = Manifest::from_slice(json.as_bytes()).unwrap();
        assert_eq!(parsed, manifest);
    }
}
