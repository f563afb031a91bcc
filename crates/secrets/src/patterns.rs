//! Regex patterns for launch strings that depend on the local filesystem.

use regex::Regex;
use std::sync::LazyLock;

/// Absolute, explicitly relative or home-relative path.
pub static PATH_LIKE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(/|\./|\.\./|~/)").unwrap());

/// Check if a command or argument looks like a filesystem path.
pub fn is_path_like(value: &str) -> bool {
    PATH_LIKE_PATTERN.is_match(value)
}
