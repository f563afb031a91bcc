//! Command handlers for the `ccm` binary.

use anyhow::{bail, Context, Result};
use ccm_common::paths::expand_local;
use ccm_common::{Error, Timestamp};
use ccm_migrate::executor::{LocalExecutor, RemoteEndpoint, SshExecutor, PROBE_TIMEOUT};
use ccm_migrate::sync::{describe_entries, preview_push};
use ccm_migrate::version::{check_compatibility, probe_provenance};
use ccm_migrate::{
    collect, Archiver, Collection, CollectorOptions, Config, Layout, PathPolicy,
    RemoteSynchronizer, ShellTransport, Unpacked,
};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

const ARCHIVE_SUFFIX: &str = ".tar.gz";

pub fn config(layout: &Layout, init: bool, path: bool) -> Result<()> {
    if path {
        println!("{}", layout.config_file.display());
        return Ok(());
    }

    if init {
        if Config::init(&layout.config_file)? {
            info!("Created config at {:?}", layout.config_file);
            info!("Edit the [target] section before running 'ccm push'");
        }
        return Ok(());
    }

    let config = Config::load(&layout.config_file);
    info!("Current configuration:");
    println!();
    println!(
        "  Target: {}://{}{}",
        config.target.kind, config.target.host, config.target.path
    );
    println!("  Port: {}", config.target.port);
    if let Some(identity) = &config.target.identity_file {
        println!("  Identity file: {}", identity);
    }
    println!("  Backup path: {}", config.backup.path);
    println!();
    println!("  Include options:");
    println!("    settings.local.json: {}", config.include.settings_local);
    println!("    ~/.claude.json (MCP): {}", config.include.mcp_config);
    println!();
    info!("Config file: {:?}", layout.config_file);

    Ok(())
}

pub async fn backup(layout: &Layout, output: Option<&str>, dry_run: bool) -> Result<()> {
    let config = Config::load(&layout.config_file);
    let dest = backup_destination(output, &config.backup.path, &Timestamp::now());

    let Some(collection) = collect_for(layout, &config, dry_run)? else {
        return Ok(());
    };
    if collection.is_empty() {
        error!("No files to back up");
        return Ok(());
    }

    if dry_run {
        info!("Would create backup at: {:?}", dest);
        info!("Files to include ({}):", collection.len());
        for line in describe_entries(&collection.entries, "~/.claude.json (MCP)") {
            info!("  {}{}", line.path, line.note);
        }
        return Ok(());
    }

    let provenance = probe_provenance(&LocalExecutor::new()).await;
    Archiver::new(provenance).pack(&collection.entries, &dest)?;
    info!("Backup contains {} files", collection.len());

    Ok(())
}

pub async fn push(
    layout: &Layout,
    target: Option<String>,
    dry_run: bool,
    skip_version_check: bool,
) -> Result<()> {
    let Some(config) = with_target(Config::load(&layout.config_file), target) else {
        error!(
            "No target configured. Run 'ccm config --init' and edit the config, \
             or specify a target: ccm push user@host"
        );
        return Ok(());
    };
    let host = config.target.host.clone();
    let remote_path = config.target.path.clone();

    let Some(collection) = collect_for(layout, &config, dry_run)? else {
        return Ok(());
    };
    if collection.is_empty() {
        error!("No files to push");
        return Ok(());
    }

    if dry_run {
        preview_push(&collection.entries, &host, &remote_path);
        return Ok(());
    }

    let endpoint = RemoteEndpoint::parse_with_port(&host, config.target.port)?;
    let identity = config.target.identity_file.as_deref().map(expand_local);

    info!("Testing connection to {}...", endpoint);
    let ssh = match SshExecutor::connect(&endpoint, identity.as_deref(), Some(PROBE_TIMEOUT)) {
        Ok(ssh) => ssh,
        Err(e) => {
            error!("Cannot connect to {}: {:#}", endpoint, e);
            error!("Check your SSH configuration.");
            return Ok(());
        }
    };
    if !ssh.probe().await {
        error!("Cannot connect to {}. Check your SSH configuration.", endpoint);
        return Ok(());
    }
    ssh.set_timeout(None);
    info!("Connection established");

    if !skip_version_check {
        let check = check_compatibility(&LocalExecutor::new(), &ssh).await;
        if let Some(warning) = check.warning {
            warn!("{}", warning);
        }
    }

    let archive = tempfile::Builder::new()
        .prefix("ccm-push-")
        .suffix(ARCHIVE_SUFFIX)
        .tempfile()
        .context("Failed to create temporary archive")?;

    let provenance = probe_provenance(&LocalExecutor::new()).await;
    Archiver::new(provenance).pack(&collection.entries, archive.path())?;

    let synchronizer = RemoteSynchronizer::new(ShellTransport::new(ssh));
    if !synchronizer
        .push(archive.path(), &host, &remote_path)
        .await
    {
        bail!("Push to {} failed", host);
    }

    Ok(())
}

pub fn extract(archive: &Path, dest: &Path) -> Result<()> {
    let unpacked = Archiver::new(Default::default())
        .unpack(archive, dest)
        .with_context(|| format!("Failed to extract {:?}", archive))?;
    info!("Extracted {:?} to {:?}", archive, dest);

    match unpacked {
        Unpacked::Manifest(manifest) => {
            info!("Manifest version: {}", manifest.version);
            info!("Created: {}", manifest.timestamp.to_iso8601());
            info!("Source host: {}", manifest.source_host);
            if let Some(version) = &manifest.claude_version {
                info!("Claude Code version: {}", version);
            }
            info!("Files ({}):", manifest.files.len());
            for entry in &manifest.files {
                info!("  {}{}", entry.relative_path, entry.symlink_note());
            }
        }
        Unpacked::NoManifest => warn!("Archive carries no manifest"),
    }

    Ok(())
}

/// Collect with the config's include options. `None` means the source root
/// is missing, which has already been reported.
fn collect_for(layout: &Layout, config: &Config, dry_run: bool) -> Result<Option<Collection>> {
    let options = CollectorOptions {
        include_settings_local: config.include.settings_local,
        include_mcp_config: config.include.mcp_config,
        dry_run,
    };

    match collect(layout, &PathPolicy::standard(), &options) {
        Ok(collection) => Ok(Some(collection)),
        Err(Error::SourceNotFound(root)) => {
            error!("Claude config directory not found at {:?}", root);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// `config` with the command-line host applied, or `None` while the host is
/// still the placeholder.
fn with_target(mut config: Config, target: Option<String>) -> Option<Config> {
    if let Some(host) = target {
        config.target.host = host;
    }
    (!config.target_is_placeholder()).then_some(config)
}

/// Where `ccm backup` writes its archive.
fn backup_destination(output: Option<&str>, backup_dir: &str, stamp: &Timestamp) -> PathBuf {
    let file_name = format!("claude-config-{}{}", stamp.to_file_stamp(), ARCHIVE_SUFFIX);
    match output {
        Some(out) if out.ends_with(ARCHIVE_SUFFIX) => expand_local(out),
        Some(dir) => expand_local(dir).join(file_name),
        None => expand_local(backup_dir).join(file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn stamp() -> Timestamp {
        Timestamp::from_datetime(Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap())
    }

    #[test]
    fn test_push_needs_a_real_target() {
        assert!(with_target(Config::default(), None).is_none());
        assert!(with_target(Config::default(), Some("user@example.com".to_string())).is_none());

        let config = with_target(Config::default(), Some("dev@build-box".to_string())).unwrap();
        assert_eq!(config.target.host, "dev@build-box");
        assert_eq!(config.target.path, "~/.claude");

        let mut configured = Config::default();
        configured.target.host = "dev@server".to_string();
        let config = with_target(configured, None).unwrap();
        assert_eq!(config.target.host, "dev@server");
    }

    #[test]
    fn test_backup_destination_explicit_file() {
        let dest = backup_destination(Some("/srv/out/mine.tar.gz"), "~/backups", &stamp());
        assert_eq!(dest, PathBuf::from("/srv/out/mine.tar.gz"));
    }

    #[test]
    fn test_backup_destination_directory() {
        let dest = backup_destination(Some("/srv/out"), "~/backups", &stamp());
        assert_eq!(
            dest,
            PathBuf::from("/srv/out/claude-config-2026-03-04T05-06-07.tar.gz")
        );
    }

    #[test]
    fn test_backup_destination_default_dir() {
        let dest = backup_destination(None, "/var/backups/claude", &stamp());
        assert_eq!(
            dest,
            PathBuf::from("/var/backups/claude/claude-config-2026-03-04T05-06-07.tar.gz")
        );
    }

    #[test]
    fn test_backup_destination_expands_home() {
        let Some(home) = std::env::var_os("HOME").map(PathBuf::from) else {
            return;
        };
        let dest = backup_destination(None, "~/backups/claude", &stamp());
        assert!(dest.starts_with(home));
        assert!(!dest.to_string_lossy().contains('~'));
    }
}
