//! Whitelist extraction of `mcpServers` from an external config file.

use crate::patterns::is_path_like;
use crate::MCP_SERVERS_KEY;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

/// Outcome of an extraction. `servers` is `None` when the file is missing,
/// unreadable, malformed or has no server map.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct McpExtraction {
    pub servers: Option<Map<String, Value>>,
    pub warnings: Vec<String>,
}

impl McpExtraction {
    /// True when there is at least one server to migrate.
    pub fn has_servers(&self) -> bool {
        self.servers.as_ref().is_some_and(|s| !s.is_empty())
    }

    /// The sanitized document written in place of the original file:
    /// `{"mcpServers": {...}}` and nothing else.
    pub fn to_document(&self) -> Option<String> {
        let servers = self.servers.as_ref()?;
        let mut doc = Map::new();
        doc.insert(MCP_SERVERS_KEY.to_string(), Value::Object(servers.clone()));
        serde_json::to_string_pretty(&Value::Object(doc)).ok()
    }
}

/// Read `path` and pull out its `mcpServers` object.
///
/// Best effort: any read or parse failure yields an empty extraction with
/// no warnings.
pub fn extract_mcp_servers(path: &Path) -> McpExtraction {
    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(e) => {
            debug!("Cannot read {:?}: {}", path, e);
            return McpExtraction::default();
        }
    };

    let document: Value = match serde_json::from_slice(&content) {
        Ok(doc) => doc,
        Err(e) => {
            debug!("Cannot parse {:?}: {}", path, e);
            return McpExtraction::default();
        }
    };

    extract_from_document(&document)
}

/// Extraction over an already parsed document.
pub fn extract_from_document(document: &Value) -> McpExtraction {
    let servers = match document.get(MCP_SERVERS_KEY).and_then(Value::as_object) {
        Some(servers) => servers.clone(),
        None => return McpExtraction::default(),
    };

    let warnings = detect_path_like(&servers);

    McpExtraction {
        servers: Some(servers),
        warnings,
    }
}

fn detect_path_like(servers: &Map<String, Value>) -> Vec<String> {
    let mut warnings = Vec::new();

    for (name, server) in servers {
        if let Some(command) = server.get("command").and_then(Value::as_str) {
            if is_path_like(command) {
                warnings.push(format!("{}: command \"{}\" is a path", name, command));
            }
        }

        let args = server.get("args").and_then(Value::as_array);
        for arg in args.into_iter().flatten().filter_map(Value::as_str) {
            if is_path_like(arg) {
                warnings.push(format!("{}: arg \"{}\" is a path", name, arg));
            }
        }
    }

    warnings
}
