//! Pushing an archive into a remote configuration directory.
//!
//! ## `push` - 9-step protocol
//!
//! 1. Resolve the remote home (for `~/` targets).
//! 2. Upload the archive to `/tmp/ccm-archive-<id>.tar.gz`.
//! 3. Extract it into `/tmp/ccm-extract-<id>`.
//! 4. Copy an existing target to `<target>.backup-<stamp>`, or `-<n>` after
//!    it if that name is taken (failure tolerated).
//! 5. `mkdir -p` the target.
//! 6. Move the secrets sentinel, if present, to `<parent>/.claude.json`.
//! 7. Drop the manifest from the scratch tree.
//! 8. Merge the scratch tree into the target.
//! 9. Remove both scratch paths.
//!
//! Any failing step other than 4 aborts the push.

use crate::transport::RemoteTransport;
use ccm_common::paths::{expand_tilde, remote_join, remote_parent};
use ccm_common::Timestamp;
use ccm_manifest::{FileEntry, MANIFEST_FILENAME, SECRETS_SENTINEL};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// File name the sanitized MCP servers are installed as, beside the target.
pub const REMOTE_SECRETS_FILE: &str = ".claude.json";

const REMOTE_TMP: &str = "/tmp";

const MAX_BACKUP_ATTEMPTS: usize = 100;

/// Protocol steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushStep {
    ResolveHome,
    Upload,
    Extract,
    Backup,
    EnsureTarget,
    RelocateSecrets,
    DropManifest,
    Merge,
    Cleanup,
}

impl fmt::Display for PushStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PushStep::ResolveHome => "resolving remote home",
            PushStep::Upload => "uploading archive",
            PushStep::Extract => "extracting archive",
            PushStep::Backup => "backing up target",
            PushStep::EnsureTarget => "creating target directory",
            PushStep::RelocateSecrets => "installing MCP config",
            PushStep::DropManifest => "removing manifest",
            PushStep::Merge => "syncing files",
            PushStep::Cleanup => "cleaning up",
        };
        f.write_str(name)
    }
}

/// A push aborted at `step`.
#[derive(Error, Debug)]
#[error("{step} failed: {cause:#}")]
pub struct PushError {
    pub step: PushStep,
    pub cause: anyhow::Error,
}

fn at<T>(step: PushStep, result: anyhow::Result<T>) -> Result<T, PushError> {
    result.map_err(|cause| PushError { step, cause })
}

/// What a successful push did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReport {
    /// Expanded remote target directory.
    pub target: String,
    /// Backup of the previous target, if one existed and was copied.
    pub backup: Option<String>,
    /// Where the MCP servers were installed, if the archive carried them.
    pub secrets: Option<String>,
}

/// One line of a preview listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewLine {
    pub path: String,
    pub note: String,
}

/// Where the secrets sentinel ends up for a given target path.
pub fn secrets_destination(target: &str) -> String {
    remote_join(remote_parent(target), REMOTE_SECRETS_FILE)
}

/// Listing of `entries` with the secrets sentinel shown as `secrets_label`.
pub fn describe_entries(entries: &[FileEntry], secrets_label: &str) -> Vec<PreviewLine> {
    entries
        .iter()
        .map(|entry| PreviewLine {
            path: if entry.relative_path == SECRETS_SENTINEL {
                secrets_label.to_string()
            } else {
                entry.relative_path.clone()
            },
            note: entry.symlink_note(),
        })
        .collect()
}

/// Drives the push protocol over a [`RemoteTransport`].
pub struct RemoteSynchronizer<T: RemoteTransport> {
    transport: T,
}

impl<T: RemoteTransport> RemoteSynchronizer<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Push `archive` to `target_path` on `host`. Returns `false` on failure,
    /// after logging what went wrong.
    pub async fn push(&self, archive: &Path, host: &str, target_path: &str) -> bool {
        match self.try_push(archive, target_path).await {
            Ok(report) => {
                if let Some(secrets) = &report.secrets {
                    info!("Installed MCP config at {}", secrets);
                }
                info!("Successfully pushed config to {}:{}", host, target_path);
                true
            }
            Err(e) => {
                error!("Push failed: {}", e);
                false
            }
        }
    }

    /// The push protocol, reporting the failing step.
    pub async fn try_push(&self, archive: &Path, target_path: &str) -> Result<PushReport, PushError> {
        let home = at(PushStep::ResolveHome, self.transport.home_dir().await)?;
        let target = expand_tilde(target_path, &home);
        debug!("Remote target: {}", target);

        let id = uuid::Uuid::new_v4();
        let scratch_archive = format!("{}/ccm-archive-{}.tar.gz", REMOTE_TMP, id);
        let scratch_dir = format!("{}/ccm-extract-{}", REMOTE_TMP, id);

        info!("Uploading archive...");
        at(
            PushStep::Upload,
            self.transport.upload(archive, &scratch_archive).await,
        )?;

        let outcome = self.apply(&scratch_archive, &scratch_dir, &target).await;

        let scratch = [scratch_archive.as_str(), scratch_dir.as_str()];
        match outcome {
            Ok(report) => {
                info!("Cleaning up...");
                at(PushStep::Cleanup, self.transport.remove_all(&scratch).await)?;
                Ok(report)
            }
            Err(e) => {
                if let Err(cleanup) = self.transport.remove_all(&scratch).await {
                    warn!(
                        "Could not remove remote scratch paths {} and {}: {:#}",
                        scratch_archive, scratch_dir, cleanup
                    );
                }
                Err(e)
            }
        }
    }

    /// Steps 3 to 8.
    async fn apply(
        &self,
        scratch_archive: &str,
        scratch_dir: &str,
        target: &str,
    ) -> Result<PushReport, PushError> {
        info!("Extracting on remote...");
        at(
            PushStep::Extract,
            self.transport.extract(scratch_archive, scratch_dir).await,
        )?;

        let backup = self.backup_existing(target).await;

        info!("Syncing files...");
        at(PushStep::EnsureTarget, self.transport.ensure_dir(target).await)?;

        let sentinel = remote_join(scratch_dir, SECRETS_SENTINEL);
        let has_secrets = at(
            PushStep::RelocateSecrets,
            self.transport.file_exists(&sentinel).await,
        )?;
        let secrets = if has_secrets {
            let dest = secrets_destination(target);
            at(
                PushStep::RelocateSecrets,
                self.transport.move_file(&sentinel, &dest).await,
            )?;
            Some(dest)
        } else {
            None
        };

        at(
            PushStep::DropManifest,
            self.transport
                .remove_file(&remote_join(scratch_dir, MANIFEST_FILENAME))
                .await,
        )?;

        at(
            PushStep::Merge,
            self.transport.merge_dir(scratch_dir, target).await,
        )?;

        Ok(PushReport {
            target: target.to_string(),
            backup,
            secrets,
        })
    }

    /// `base`, or `base-<n>` for the first `n` nothing occupies yet.
    async fn unused_path(&self, base: &str) -> anyhow::Result<String> {
        for n in 0..MAX_BACKUP_ATTEMPTS {
            let candidate = match n {
                0 => base.to_string(),
                n => format!("{}-{}", base, n),
            };
            if !self.transport.dir_exists(&candidate).await?
                && !self.transport.file_exists(&candidate).await?
            {
                return Ok(candidate);
            }
        }
        anyhow::bail!("no unused backup name starting with {}", base)
    }

    /// Step 4. Never fails the push.
    async fn backup_existing(&self, target: &str) -> Option<String> {
        match self.transport.dir_exists(target).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("No existing target at {}, skipping backup", target);
                return None;
            }
            Err(e) => {
                warn!("{} failed: {:#}", PushStep::Backup, e);
                return None;
            }
        }

        let stamped = format!(
            "{}.backup-{}",
            target.trim_end_matches('/'),
            Timestamp::now().to_backup_suffix()
        );
        let backup = match self.unused_path(&stamped).await {
            Ok(path) => path,
            Err(e) => {
                warn!("{} failed: {:#}", PushStep::Backup, e);
                return None;
            }
        };
        info!("Creating backup of existing config at {}", backup);
        match self.transport.copy_dir(target, &backup).await {
            Ok(()) => Some(backup),
            Err(e) => {
                warn!("{} failed: {:#}", PushStep::Backup, e);
                None
            }
        }
    }
}

/// Log what a push would transfer without touching the remote.
pub fn preview_push(entries: &[FileEntry], host: &str, target_path: &str) -> Vec<PreviewLine> {
    let label = format!("{} (MCP servers)", secrets_destination(target_path));
    let lines = describe_entries(entries, &label);

    info!("Would push to {}:{}", host, target_path);
    info!("Files to transfer ({}):", lines.len());
    for line in &lines {
        info!("  {}{}", line.path, line.note);
    }

    lines
}
