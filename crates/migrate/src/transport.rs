//! The remote operations the push protocol is built from.

use crate::executor::Executor;
use anyhow::{Context, Result};
use async_trait::async_trait;
use ccm_common::paths::shell_quote;
use std::path::Path;
use tracing::debug;

/// Filesystem operations on the remote side. Paths are absolute and already
/// expanded; implementations must not interpret `~`.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Home directory of the remote user.
    async fn home_dir(&self) -> Result<String>;

    /// Copy a local file to `remote`.
    async fn upload(&self, local: &Path, remote: &str) -> Result<()>;

    /// Create `dest_dir` and unpack the gzip tarball `archive` into it.
    async fn extract(&self, archive: &str, dest_dir: &str) -> Result<()>;

    async fn dir_exists(&self, path: &str) -> Result<bool>;

    async fn file_exists(&self, path: &str) -> Result<bool>;

    /// Recursive copy of the contents of `from` into a new directory `to`.
    /// A symlinked `from` is followed, so `to` is never a link.
    async fn copy_dir(&self, from: &str, to: &str) -> Result<()>;

    /// `mkdir -p`.
    async fn ensure_dir(&self, path: &str) -> Result<()>;

    /// Move a file, replacing `to` if it exists.
    async fn move_file(&self, from: &str, to: &str) -> Result<()>;

    /// Remove a file; a missing file is not an error.
    async fn remove_file(&self, path: &str) -> Result<()>;

    /// Copy the contents of `from` into `into`, overwriting same-named files
    /// and leaving everything else in `into` alone.
    async fn merge_dir(&self, from: &str, into: &str) -> Result<()>;

    /// Recursively remove every path; missing paths are not an error.
    async fn remove_all(&self, paths: &[&str]) -> Result<()>;
}

/// [`RemoteTransport`] over POSIX shell commands run by an [`Executor`].
pub struct ShellTransport<E: Executor> {
    executor: E,
}

impl<E: Executor> ShellTransport<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    /// Run `command`, failing on a non-zero exit status. Returns stdout.
    async fn run(&self, command: &str) -> Result<String> {
        let (exit_code, stdout, stderr) = self
            .executor
            .execute(command)
            .await
            .with_context(|| format!("Failed to run `{}`", command))?;

        match exit_code {
            Some(0) => Ok(stdout),
            code => anyhow::bail!(
                "`{}` exited with {:?}: {}",
                command,
                code,
                stderr.trim()
            ),
        }
    }

    async fn test(&self, flag: &str, path: &str) -> Result<bool> {
        let out = self
            .run(&format!(
                "if [ {} {} ]; then echo yes; else echo no; fi",
                flag,
                shell_quote(path)
            ))
            .await?;
        debug!("test {} {} -> {}", flag, path, out.trim());
        Ok(out.trim() == "yes")
    }
}

#[async_trait]
impl<E: Executor> RemoteTransport for ShellTransport<E> {
    async fn home_dir(&self) -> Result<String> {
        let home = self.run("echo $HOME").await?.trim().to_string();
        if home.is_empty() {
            anyhow::bail!("Remote $HOME is empty");
        }
        Ok(home)
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        self.executor.upload(local, remote).await
    }

    async fn extract(&self, archive: &str, dest_dir: &str) -> Result<()> {
        let dest = shell_quote(dest_dir);
        self.run(&format!(
            "mkdir -p {} && tar -xzf {} -C {}",
            dest,
            shell_quote(archive),
            dest
        ))
        .await?;
        Ok(())
    }

    async fn dir_exists(&self, path: &str) -> Result<bool> {
        self.test("-d", path).await
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        self.test("-f", path).await
    }

    async fn copy_dir(&self, from: &str, to: &str) -> Result<()> {
        let source = format!("{}/.", from.trim_end_matches('/'));
        let dest = shell_quote(to);
        self.run(&format!(
            "mkdir -p {} && cp -Rp {} {}/",
            dest,
            shell_quote(&source),
            dest
        ))
        .await?;
        Ok(())
    }

    async fn ensure_dir(&self, path: &str) -> Result<()> {
        self.run(&format!("mkdir -p {}", shell_quote(path))).await?;
        Ok(())
    }

    async fn move_file(&self, from: &str, to: &str) -> Result<()> {
        self.run(&format!("mv -f {} {}", shell_quote(from), shell_quote(to)))
            .await?;
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        self.run(&format!("rm -f {}", shell_quote(path))).await?;
        Ok(())
    }

    async fn merge_dir(&self, from: &str, into: &str) -> Result<()> {
        let source = format!("{}/.", from.trim_end_matches('/'));
        let dest = format!("{}/", into.trim_end_matches('/'));
        self.run(&format!(
            "cp -Rp {} {}",
            shell_quote(&source),
            shell_quote(&dest)
        ))
        .await?;
        Ok(())
    }

    async fn remove_all(&self, paths: &[&str]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let quoted: Vec<String> = paths.iter().map(|p| shell_quote(p)).collect();
        self.run(&format!("rm -rf {}", quoted.join(" "))).await?;
        Ok(())
    }
}
