//! Which top-level names under the source root take part in a migration.

/// Static classification of top-level names. The three lists are disjoint.
#[derive(Debug, Clone, Copy)]
pub struct PathPolicy {
    /// Must exist; absence is reported as a warning.
    pub always_include: &'static [&'static str],
    /// Optional; silently skipped when absent.
    pub include_if_present: &'static [&'static str],
    /// Post-filter on the first segment of every collected relative path.
    pub never_migrate: &'static [&'static str],
}

/// Local-only settings file, collected only on request.
pub const SETTINGS_LOCAL: &str = "settings.local.json";

const ALWAYS_INCLUDE: &[&str] = &["CLAUDE.md", "settings.json", "agents", "skills"];

const INCLUDE_IF_PRESENT: &[&str] = &["statusline.ts", "statusline.sh", "keybindings.json", "hooks"];

const NEVER_MIGRATE: &[&str] = &[
    "plugins",
    "projects",
    "history.jsonl",
    "debug",
    "todos",
    "cache",
    "telemetry",
    "statsig",
    "shell-snapshots",
    "paste-cache",
    "file-history",
    "session-env",
    "plans",
    "tasks",
    "ide",
    "downloads",
];

impl PathPolicy {
    /// The layout of a Claude Code configuration directory.
    pub const fn standard() -> Self {
        Self {
            always_include: ALWAYS_INCLUDE,
            include_if_present: INCLUDE_IF_PRESENT,
            never_migrate: NEVER_MIGRATE,
        }
    }

    /// Whether a `/`-separated relative path falls in an excluded subtree.
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        let first = relative_path.split('/').next().unwrap_or(relative_path);
        self.never_migrate.contains(&first)
    }
}

impl Default for PathPolicy {
    fn default() -> Self {
        Self::standard()
    }
}
