//! Core error handling and configuration for ado-mcp-tools.
//!
//! This crate provides the foundational types shared by the download manager,
//! the MCP server and the CLI.

pub mod config;
pub mod error;

pub use config::{Config, DownloadsConfig};
pub use error::{Error, Result};
