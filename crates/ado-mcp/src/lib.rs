//! MCP (Model Context Protocol) server for ado-mcp-tools.
//!
//! Exposes the download staging area to AI assistants as the
//! `list_downloads`, `cleanup_downloads` and `get_download_location` tools.

pub mod format;
pub mod handlers;
pub mod protocol;
pub mod server;
pub mod transport;

pub use handlers::ToolHandler;
pub use server::McpServer;
