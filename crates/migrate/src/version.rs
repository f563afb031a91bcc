//! Advisory comparison of local and remote `claude` versions, plus the
//! local provenance probes recorded in every manifest.

use crate::executor::Executor;
use ccm_manifest::Provenance;
use regex::Regex;
use semver::Version;
use std::sync::LazyLock;
use tracing::debug;

/// First `major.minor.patch` in a `--version` output.
pub static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d+\.\d+)").unwrap());

const VERSION_COMMAND: &str = "claude --version";

/// Outcome of a compatibility check. `compatible` is always `true`; the
/// check only ever warns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCheck {
    pub compatible: bool,
    pub warning: Option<String>,
}

impl VersionCheck {
    fn ok() -> Self {
        Self {
            compatible: true,
            warning: None,
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            compatible: true,
            warning: Some(message.into()),
        }
    }
}

/// Extract the version number from `claude --version` output.
pub fn parse_version_output(output: &str) -> Option<String> {
    VERSION_PATTERN
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Run `claude --version` through `executor`. Any failure yields `None`.
pub async fn probe_version(executor: &dyn Executor) -> Option<String> {
    match executor.execute(VERSION_COMMAND).await {
        Ok((Some(0), stdout, _)) => parse_version_output(&stdout),
        Ok((code, _, stderr)) => {
            debug!("`{}` exited with {:?}: {}", VERSION_COMMAND, code, stderr.trim());
            None
        }
        Err(e) => {
            debug!("`{}` failed: {:#}", VERSION_COMMAND, e);
            None
        }
    }
}

/// Compare two probed versions.
pub fn compare_versions(local: Option<&str>, remote: Option<&str>) -> VersionCheck {
    let Some(local_str) = local else {
        return VersionCheck::warn("Could not determine local Claude version");
    };
    let Some(remote_str) = remote else {
        return VersionCheck::warn(
            "Could not determine remote Claude version (Claude may not be installed)",
        );
    };

    let (Some(local), Some(remote)) = (numeric_version(local_str), numeric_version(remote_str))
    else {
        return VersionCheck::ok();
    };

    if local.major != remote.major {
        return VersionCheck::warn(format!(
            "Major version mismatch: local {} vs remote {}",
            local_str, remote_str
        ));
    }

    if local.minor != remote.minor {
        debug!(
            "Minor version difference: local {} vs remote {}",
            local_str, remote_str
        );
    }

    VersionCheck::ok()
}

/// `major.minor.patch` read as plain integers, so `2.01.0` is `2.1.0`.
/// Anything after the first three components is ignored.
fn numeric_version(s: &str) -> Option<Version> {
    let mut parts = s.trim().split('.');
    let mut next = || parts.next().and_then(|p| p.parse::<u64>().ok());
    Some(Version::new(next()?, next()?, next()?))
}

/// Probe both sides and compare.
pub async fn check_compatibility(local: &dyn Executor, remote: &dyn Executor) -> VersionCheck {
    let local_version = probe_version(local).await;
    let remote_version = probe_version(remote).await;
    compare_versions(local_version.as_deref(), remote_version.as_deref())
}

/// Host name and tool version of the machine `executor` runs on.
pub async fn probe_provenance(executor: &dyn Executor) -> Provenance {
    let source_host = match executor.execute("hostname").await {
        Ok((Some(0), stdout, _)) if !stdout.trim().is_empty() => stdout.trim().to_string(),
        _ => "unknown".to_string(),
    };

    Provenance {
        source_host,
        tool_version: probe_version(executor).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::path::Path;

    struct Scripted(Option<&'static str>);

    #[async_trait]
    impl Executor for Scripted {
        async fn execute(&self, _command: &str) -> Result<(Option<i32>, String, String)> {
            match self.0 {
                Some(out) => Ok((Some(0), out.to_string(), String::new())),
                None => Ok((Some(127), String::new(), "claude: not found".to_string())),
            }
        }

        async fn upload(&self, _local: &Path, _remote: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_parse_version_output() {
        assert_eq!(
            parse_version_output("2.1.0 (Claude Code)\n").as_deref(),
            Some("2.1.0")
        );
        assert_eq!(parse_version_output("claude v10.20.30-beta").as_deref(), Some("10.20.30"));
        assert_eq!(parse_version_output("unknown"), None);
    }

    #[test]
    fn test_major_mismatch_warns() {
        let check = compare_versions(Some("2.1.0"), Some("3.0.0"));
        assert!(check.compatible);
        let warning = check.warning.unwrap();
        assert!(warning.contains("2.1.0"));
        assert!(warning.contains("3.0.0"));
    }

    #[test]
    fn test_minor_mismatch_is_silent() {
        assert_eq!(compare_versions(Some("2.1.0"), Some("2.9.0")), VersionCheck::ok());
    }

    #[test]
    fn test_leading_zeros_still_compare() {
        let check = compare_versions(Some("2.01.0"), Some("3.0.0"));
        assert_eq!(
            check.warning.as_deref(),
            Some("Major version mismatch: local 2.01.0 vs remote 3.0.0")
        );
        assert_eq!(compare_versions(Some("02.1.0"), Some("2.9.0")), VersionCheck::ok());
    }

    #[test]
    fn test_unparsable_is_compatible() {
        assert_eq!(compare_versions(Some("2.1"), Some("3.0.0")), VersionCheck::ok());
    }

    #[test]
    fn test_missing_versions_warn() {
        let check = compare_versions(None, Some("2.1.0"));
        assert!(check.compatible);
        assert!(check.warning.unwrap().contains("local"));

        let check = compare_versions(Some("2.1.0"), None);
        assert!(check.compatible);
        assert!(check.warning.unwrap().contains("remote"));
    }

    #[tokio::test]
    async fn test_check_compatibility_probes_both_sides() {
        let check = check_compatibility(
            &Scripted(Some("2.1.0 (Claude Code)")),
            &Scripted(Some("3.0.0 (Claude Code)")),
        )
        .await;
        assert_eq!(
            check.warning.as_deref(),
            Some("Major version mismatch: local 2.1.0 vs remote 3.0.0")
        );

        let check = check_compatibility(&Scripted(Some("2.1.0")), &Scripted(None)).await;
        assert!(check.compatible);
        assert!(check.warning.is_some());
    }

    #[tokio::test]
    async fn test_provenance_falls_back() {
        let provenance = probe_provenance(&Scripted(None)).await;
        assert_eq!(provenance.source_host, "unknown");
        assert_eq!(provenance.tool_version, None);
    }
}
