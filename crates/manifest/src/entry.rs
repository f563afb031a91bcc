//! A single unit of migration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One file of a migration set.
///
/// `relative_path` always uses `/` separators and is unique within a
/// collection. When `inline_content` is set it replaces the bytes of
/// `source_path` at materialization time; it is never serialized into the
/// manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub source_path: PathBuf,
    pub relative_path: String,
    pub is_symlink: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_symlink_target: Option<String>,
    #[serde(skip)]
    pub inline_content: Option<String>,
}

impl FileEntry {
    /// A regular file copied as-is.
    pub fn file(source_path: impl Into<PathBuf>, relative_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            relative_path: relative_path.into(),
            is_symlink: false,
            original_symlink_target: None,
            inline_content: None,
        }
    }

    /// A symlink resolved to `real_path`; `link_text` is kept for display only.
    pub fn symlink(
        real_path: impl Into<PathBuf>,
        relative_path: impl Into<String>,
        link_text: impl Into<String>,
    ) -> Self {
        Self {
            source_path: real_path.into(),
            relative_path: relative_path.into(),
            is_symlink: true,
            original_symlink_target: Some(link_text.into()),
            inline_content: None,
        }
    }

    /// An entry whose destination content is `content` rather than a copy of
    /// `source_path`.
    pub fn inline(
        source_path: impl Into<PathBuf>,
        relative_path: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            relative_path: relative_path.into(),
            is_symlink: false,
            original_symlink_target: None,
            inline_content: Some(content.into()),
        }
    }

    /// First `/`-separated segment of the relative path.
    pub fn first_segment(&self) -> &str {
        self.relative_path
            .split('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    /// Suffix shown next to symlinked entries in listings.
    pub fn symlink_note(&self) -> String {
        match (&self.is_symlink, &self.original_symlink_target) {
            (true, Some(target)) => format!(" (symlink -> {})", target),
            _ => String::new(),
        }
    }
}
