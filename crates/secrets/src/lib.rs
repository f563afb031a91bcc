//! MCP server extraction for ccm.
//!
//! `~/.claude.json` mixes MCP server launch definitions with machine-local
//! state (project history, OAuth session data, caches). Only the
//! `mcpServers` object is allowed to leave the machine; this crate pulls it
//! out and flags launch strings that will not resolve on another host.

pub mod extractor;
pub mod patterns;

pub use extractor::{extract_mcp_servers, McpExtraction};

/// Top-level key holding the server launch definitions.
pub const MCP_SERVERS_KEY: &str = "mcpServers";
