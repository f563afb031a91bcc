//! Archive schema definitions for ccm.
//!
//! This crate defines what a migration set looks like on the wire:
//! the file entries, the manifest bundled at the archive root and the
//! reserved sentinel names.

pub mod entry;
pub mod manifest;
pub mod validation;

pub use entry::FileEntry;
pub use manifest::{Manifest, Provenance};
pub use validation::{validate_entries, ValidationError, ValidationResult};

/// Name of the manifest file at the root of every archive.
pub const MANIFEST_FILENAME: &str = ".ccm-manifest.json";

/// Relative name of the synthetic entry carrying the sanitized MCP servers.
pub const SECRETS_SENTINEL: &str = ".mcp-config.json";

/// Archive format version written into every manifest.
pub const FORMAT_VERSION: &str = "1.0.0";
