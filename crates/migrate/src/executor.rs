//! Command executors for the local machine and SSH remotes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ssh2::{Channel, CheckResult, KnownHostFileKind, Session};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::debug;

/// Timeout for the initial reachability probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Trait for command execution.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute a command and return (exit_code, stdout, stderr).
    async fn execute(&self, command: &str) -> Result<(Option<i32>, String, String)>;

    /// Copy a local file to `remote` on the machine commands run on.
    async fn upload(&self, local: &Path, remote: &str) -> Result<()>;
}

/// `user@host[:port]` as written on the command line or in the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    pub user: Option<String>,
    pub host: String,
    pub port: u16,
}

impl RemoteEndpoint {
    /// Parse, using `default_port` when the string carries none.
    pub fn parse_with_port(s: &str, default_port: u16) -> Result<Self> {
        let mut endpoint: Self = s.parse()?;
        if !s.rsplit_once('@').map_or(s, |(_, h)| h).contains(':') {
            endpoint.port = default_port;
        }
        Ok(endpoint)
    }
}

impl FromStr for RemoteEndpoint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user, rest) = match s.rsplit_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some(_) => anyhow::bail!("Invalid remote endpoint: {}", s),
            None => (None, s),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .with_context(|| format!("Invalid port in endpoint: {}", s))?;
                (host, port)
            }
            None => (rest, 22),
        };

        if host.is_empty() {
            anyhow::bail!("Invalid remote endpoint: {}", s);
        }

        Ok(Self {
            user,
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        write!(f, "{}", self.host)?;
        if self.port != 22 {
            write!(f, ":{}", self.port)?;
        }
        Ok(())
    }
}

/// Local executor for probes on this machine and for tests.
pub struct LocalExecutor;

impl LocalExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    async fn execute(&self, command: &str) -> Result<(Option<i32>, String, String)> {
        debug!("Local exec: {}", command);

        let output = if cfg!(target_os = "windows") {
            Command::new("cmd")
                .args(["/C", command])
                .output()
                .context("Failed to execute command")?
        } else {
            Command::new("sh")
                .args(["-c", command])
                .output()
                .context("Failed to execute command")?
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code();

        Ok((exit_code, stdout, stderr))
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        debug!("Local copy: {:?} -> {}", local, remote);
        if let Some(parent) = Path::new(remote).parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        tokio::fs::copy(local, remote)
            .await
            .with_context(|| format!("Failed to copy {:?} to {}", local, remote))?;
        Ok(())
    }
}

/// SSH executor for remote hosts.
pub struct SshExecutor {
    session: Session,
}

impl SshExecutor {
    /// Connect to a remote host via SSH.
    ///
    /// `timeout` bounds the TCP connect and every blocking session call until
    /// it is cleared with [`SshExecutor::set_timeout`].
    pub fn connect(
        endpoint: &RemoteEndpoint,
        key_path: Option<&Path>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let addr = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve {}", endpoint.host))?
            .next()
            .with_context(|| format!("No address for {}", endpoint.host))?;

        let tcp = match timeout {
            Some(t) => TcpStream::connect_timeout(&addr, t),
            None => TcpStream::connect(addr),
        }
        .context("Failed to connect to SSH host")?;

        let mut session = Session::new().context("Failed to create SSH session")?;
        if let Some(t) = timeout {
            session.set_timeout(t.as_millis() as u32);
        }
        session.set_tcp_stream(tcp);
        session.handshake().context("SSH handshake failed")?;
        verify_host_key(&session, endpoint)?;

        let username = endpoint
            .user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "root".to_string());

        if let Some(key) = key_path {
            session
                .userauth_pubkey_file(&username, None, key, None)
                .context("SSH key authentication failed")?;
        } else {
            try_agent(&session, &username);
            if !session.authenticated() {
                for key in default_identity_files() {
                    if session
                        .userauth_pubkey_file(&username, None, &key, None)
                        .is_ok()
                    {
                        debug!("Authenticated with {:?}", key);
                        break;
                    }
                }
            }
        }

        if !session.authenticated() {
            anyhow::bail!("No valid SSH authentication method available");
        }

        Ok(Self { session })
    }

    /// Replace the blocking-call timeout; `None` waits indefinitely.
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        self.session
            .set_timeout(timeout.map_or(0, |t| t.as_millis() as u32));
    }

    /// Reachability probe: `echo ok` must come back as `ok`.
    pub async fn probe(&self) -> bool {
        match self.execute("echo ok").await {
            Ok((Some(0), stdout, _)) => stdout.trim() == "ok",
            Ok(_) => false,
            Err(e) => {
                debug!("Probe failed: {:#}", e);
                false
            }
        }
    }
}

/// Drain stdout and stderr side by side on a non-blocking session, so a
/// command that fills one window cannot stall on it. `timeout_ms` of 0 waits
/// indefinitely.
fn read_both(channel: &Channel, timeout_ms: u32) -> Result<(Vec<u8>, Vec<u8>)> {
    let started = Instant::now();
    let limit = Duration::from_millis(timeout_ms.into());
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    loop {
        // EOF is sampled first: once seen, everything before it is buffered.
        let eof = channel.eof();
        let read = read_available(&mut channel.stream(0), &mut stdout)
            .context("Failed to read stdout")?
            + read_available(&mut channel.stderr(), &mut stderr)
                .context("Failed to read stderr")?;

        if read > 0 {
            continue;
        }
        if eof {
            return Ok((stdout, stderr));
        }
        if timeout_ms > 0 && started.elapsed() > limit {
            anyhow::bail!("Timed out waiting for command output");
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Append whatever `stream` has ready to `buf`; returns the byte count.
fn read_available(stream: &mut impl Read, buf: &mut Vec<u8>) -> std::io::Result<usize> {
    let mut chunk = [0u8; 8192];
    let mut total = 0;
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => return Ok(total),
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                total += n;
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(total),
            Err(e) => return Err(e),
        }
    }
}

/// Check the server's key against `~/.ssh/known_hosts` before any
/// credentials are offered.
fn verify_host_key(session: &Session, endpoint: &RemoteEndpoint) -> Result<()> {
    let path = known_hosts_path().context("Cannot determine home directory for known_hosts")?;
    let mut known = session
        .known_hosts()
        .context("Failed to initialize known hosts")?;
    if path.is_file() {
        known
            .read_file(&path, KnownHostFileKind::OpenSSH)
            .with_context(|| format!("Failed to read {:?}", path))?;
    }

    let (key, _) = session
        .host_key()
        .context("SSH server did not present a host key")?;
    host_key_verdict(known.check_port(&endpoint.host, endpoint.port, key), endpoint, &path)
}

fn host_key_verdict(result: CheckResult, endpoint: &RemoteEndpoint, known_hosts: &Path) -> Result<()> {
    match result {
        CheckResult::Match => Ok(()),
        CheckResult::NotFound => anyhow::bail!(
            "Host key for {} is not in {:?}; connect once with ssh to verify and record it",
            endpoint,
            known_hosts
        ),
        CheckResult::Mismatch => anyhow::bail!(
            "Host key for {} does not match the one recorded in {:?}",
            endpoint,
            known_hosts
        ),
        CheckResult::Failure => anyhow::bail!("Could not check the host key for {}", endpoint),
    }
}

fn known_hosts_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ssh").join("known_hosts"))
}

fn try_agent(session: &Session, username: &str) {
    let Ok(mut agent) = session.agent() else {
        return;
    };
    if agent.connect().is_err() || agent.list_identities().is_err() {
        return;
    }
    let Ok(identities) = agent.identities() else {
        return;
    };
    for identity in identities {
        if agent.userauth(username, &identity).is_ok() {
            break;
        }
    }
}

fn default_identity_files() -> Vec<PathBuf> {
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };
    ["id_ed25519", "id_ecdsa", "id_rsa"]
        .iter()
        .map(|name| home.join(".ssh").join(name))
        .filter(|path| path.is_file())
        .collect()
}

#[async_trait]
impl Executor for SshExecutor {
    async fn execute(&self, command: &str) -> Result<(Option<i32>, String, String)> {
        debug!("SSH exec: {}", command);

        let mut channel = self
            .session
            .channel_session()
            .context("Failed to open SSH channel")?;
        channel
            .exec(command)
            .context("Failed to execute SSH command")?;

        let timeout_ms = self.session.timeout();
        self.session.set_blocking(false);
        let output = read_both(&channel, timeout_ms);
        self.session.set_blocking(true);
        let (stdout, stderr) = output?;

        channel.wait_close().ok();
        let exit_code = channel.exit_status().ok();

        Ok((
            exit_code,
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
        ))
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        debug!("SCP upload: {:?} -> {}", local, remote);

        let mut file =
            File::open(local).with_context(|| format!("Failed to open {:?}", local))?;
        let size = file.metadata()?.len();

        let mut channel = self
            .session
            .scp_send(Path::new(remote), 0o644, size, None)
            .context("Failed to start SCP upload")?;
        std::io::copy(&mut file, &mut channel).context("SCP upload failed")?;

        channel.send_eof().context("SCP upload failed")?;
        channel.wait_eof().context("SCP upload failed")?;
        channel.close().context("SCP upload failed")?;
        channel.wait_close().context("SCP upload failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        let ep: RemoteEndpoint = "dev@build-box".parse().unwrap();
        assert_eq!(ep.user.as_deref(), Some("dev"));
        assert_eq!(ep.host, "build-box");
        assert_eq!(ep.port, 22);

        let ep: RemoteEndpoint = "dev@10.0.0.5:2222".parse().unwrap();
        assert_eq!(ep.host, "10.0.0.5");
        assert_eq!(ep.port, 2222);
        assert_eq!(ep.to_string(), "dev@10.0.0.5:2222");

        let ep: RemoteEndpoint = "build-box".parse().unwrap();
        assert_eq!(ep.user, None);
        assert_eq!(ep.to_string(), "build-box");
    }

    #[test]
    fn test_parse_invalid_endpoint() {
        assert!("@host".parse::<RemoteEndpoint>().is_err());
        assert!("dev@".parse::<RemoteEndpoint>().is_err());
        assert!("dev@host:ssh".parse::<RemoteEndpoint>().is_err());
    }

    #[test]
    fn test_default_port_applies_only_when_missing() {
        let ep = RemoteEndpoint::parse_with_port("dev@host", 2200).unwrap();
        assert_eq!(ep.port, 2200);
        let ep = RemoteEndpoint::parse_with_port("dev@host:2222", 2200).unwrap();
        assert_eq!(ep.port, 2222);
    }

    #[test]
    fn test_only_a_recorded_matching_host_key_passes() {
        let ep: RemoteEndpoint = "dev@build-box:2222".parse().unwrap();
        let file = Path::new("/home/dev/.ssh/known_hosts");

        assert!(host_key_verdict(CheckResult::Match, &ep, file).is_ok());

        let err = host_key_verdict(CheckResult::NotFound, &ep, file).unwrap_err();
        assert!(err.to_string().contains("not in"));
        assert!(err.to_string().contains("dev@build-box:2222"));

        let err = host_key_verdict(CheckResult::Mismatch, &ep, file).unwrap_err();
        assert!(err.to_string().contains("does not match"));

        assert!(host_key_verdict(CheckResult::Failure, &ep, file).is_err());
    }

    /// Hands out its chunks, then reports that nothing more is ready yet.
    struct Trickle(Vec<&'static [u8]>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.0.pop() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
                None => Err(std::io::ErrorKind::WouldBlock.into()),
            }
        }
    }

    #[test]
    fn test_read_available_stops_at_would_block() {
        let mut stream = Trickle(vec![&b"world"[..], &b"hello "[..]]);
        let mut buf = b"> ".to_vec();
        assert_eq!(read_available(&mut stream, &mut buf).unwrap(), 11);
        assert_eq!(buf, b"> hello world");
        assert_eq!(read_available(&mut stream, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_read_available_stops_at_eof() {
        let mut buf = Vec::new();
        let n = read_available(&mut &b"done"[..], &mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(buf, b"done");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_executor() {
        let executor = LocalExecutor::new();
        let (code, stdout, _) = executor.execute("echo hello").await.unwrap();
        assert_eq!(code, Some(0));
        assert_eq!(stdout.trim(), "hello");

        let (code, _, _) = executor.execute("exit 3").await.unwrap();
        assert_eq!(code, Some(3));
    }

    #[tokio::test]
    async fn test_local_upload_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.tar.gz");
        std::fs::write(&src, b"payload").unwrap();
        let dest = dir.path().join("remote").join("tmp").join("a.tar.gz");

        LocalExecutor::new()
            .upload(&src, dest.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(std::fs::read(dest).unwrap(), b"payload");
    }
}
