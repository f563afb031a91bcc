//! Structural checks over a collected entry list.

use crate::FileEntry;
use std::collections::HashSet;
use thiserror::Error;

/// A structural problem in an entry list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Duplicate relative path: {0}")]
    DuplicatePath(String),

    #[error("Relative path escapes the archive root: {0}")]
    EscapingPath(String),

    #[error("Excluded path present: {0}")]
    ExcludedPath(String),
}

/// Result of validating an entry list.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.valid = false;
        self.errors.push(error);
    }
}

/// Check uniqueness, containment and exclusion of every relative path.
///
/// `excluded` is matched against the first path segment only.
pub fn validate_entries(entries: &[FileEntry], excluded: &[&str]) -> ValidationResult {
    let mut result = ValidationResult::new();
    let mut seen = HashSet::new();

    for entry in entries {
        let rel = &entry.relative_path;

        if !seen.insert(rel.as_str()) {
            result.add_error(ValidationError::DuplicatePath(rel.clone()));
        }

        if rel.is_empty() || rel.starts_with('/') || rel.split('/').any(|seg| seg == "..") {
            result.add_error(ValidationError::EscapingPath(rel.clone()));
        }

        if excluded.contains(&entry.first_segment()) {
            result.add_error(ValidationError::ExcludedPath(rel.clone()));
        }
    }

    result
}
