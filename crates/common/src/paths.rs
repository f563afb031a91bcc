//! Path helpers shared by the local and remote sides.

use std::path::PathBuf;

/// Expand a leading `~/` against `home`. Other paths are returned unchanged.
///
/// `home` is a plain string because the remote home directory is only known
/// as the output of a shell probe.
pub fn expand_tilde(path: &str, home: &str) -> String {
    match path.strip_prefix("~/") {
        Some(rest) => format!("{}/{}", home.trim_end_matches('/'), rest),
        None if path == "~" => home.to_string(),
        None => path.to_string(),
    }
}

/// Expand `~/` against the local user's home directory.
pub fn expand_local(path: &str) -> PathBuf {
    match dirs::home_dir() {
        Some(home) => PathBuf::from(expand_tilde(path, &home.to_string_lossy())),
        None => PathBuf::from(path),
    }
}

/// Parent directory of a `/`-separated remote path.
pub fn remote_parent(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(idx) => &trimmed[..idx],
        None => ".",
    }
}

/// Join two `/`-separated remote path fragments.
pub fn remote_join(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Quote a string for a POSIX shell using single quotes.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("~/.claude", "/home/dev"), "/home/dev/.claude");
        assert_eq!(expand_tilde("~/.claude", "/home/dev/"), "/home/dev/.claude");
        assert_eq!(expand_tilde("~", "/root"), "/root");
        assert_eq!(expand_tilde("/opt/claude", "/home/dev"), "/opt/claude");
        assert_eq!(expand_tilde("~other/x", "/home/dev"), "~other/x");
    }

    #[test]
    fn test_remote_parent() {
        assert_eq!(remote_parent("/home/dev/.claude"), "/home/dev");
        assert_eq!(remote_parent("/home/dev/.claude/"), "/home/dev");
        assert_eq!(remote_parent("/.claude"), "/");
        assert_eq!(remote_parent(".claude"), ".");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/tmp/a b"), "'/tmp/a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
