//! Tool handlers for the MCP server.
//!
//! Each tool is a thin adapter: parse arguments, call the download manager,
//! render the result.

use std::sync::Arc;
use std::time::Duration;

use ado_core::Result;
use ado_downloads::{CleanupFilter, DownloadCategory, DownloadFilter, TempDownloadManager};
use serde::Deserialize;
use serde_json::Value;

use crate::format::{self, LocationInfo, OutputFormat};
use crate::protocol::{ToolCallResult, ToolDefinition};

/// Tool handler backed by the download manager.
pub struct ToolHandler {
    manager: Arc<TempDownloadManager>,
}

impl ToolHandler {
    /// Create a new tool handler.
    pub fn new(manager: Arc<TempDownloadManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<TempDownloadManager> {
        &self.manager
    }

    /// Get available tool definitions.
    pub fn available_tools(&self) -> Vec<ToolDefinition> {
        let category = serde_json::json!({
            "type": "string",
            "enum": ["logs-by-name", "job-logs", "artifacts"],
            "description": "Only include downloads of this kind"
        });
        let build_id = serde_json::json!({
            "type": "integer",
            "minimum": 0,
            "description": "Only include downloads of this build"
        });
        let format = serde_json::json!({
            "type": "string",
            "enum": ["markdown", "json"],
            "description": "Output format (default: markdown)"
        });

        vec![
            ToolDefinition {
                name: "list_downloads".to_string(),
                description: "List build logs and artifacts staged in the temporary download \
                              directory"
                    .to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "category": category,
                        "build_id": build_id,
                        "format": format
                    }
                }),
            },
            ToolDefinition {
                name: "cleanup_downloads".to_string(),
                description: "Delete staged downloads, optionally only for one build, one \
                              category or files older than a given age"
                    .to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "category": category,
                        "build_id": build_id,
                        "older_than_ms": {
                            "type": "integer",
                            "minimum": 0,
                            "description": "Only delete files at least this many milliseconds old"
                        },
                        "format": format
                    }
                }),
            },
            ToolDefinition {
                name: "get_download_location".to_string(),
                description: "Show the directory where downloads are staged for this server"
                    .to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "format": format
                    }
                }),
            },
        ]
    }

    /// Execute a tool by name with arguments.
    pub async fn execute(&self, name: &str, arguments: Option<Value>) -> ToolCallResult {
        let outcome = match name {
            "list_downloads" => self.handle_list_downloads(arguments).await,
            "cleanup_downloads" => self.handle_cleanup_downloads(arguments).await,
            "get_download_location" => self.handle_get_download_location(arguments).await,
            _ => return ToolCallResult::error(format!("Unknown tool: {}", name)),
        };

        match outcome {
            Ok(text) => ToolCallResult::text(text),
            Err(e) => {
                tracing::warn!("Tool {} failed: {}", name, e);
                ToolCallResult::error(format!("{} failed: {}", name, e))
            }
        }
    }

    async fn handle_list_downloads(&self, arguments: Option<Value>) -> Result<String> {
        let params: ListDownloadsParams = parse_arguments(arguments)?;
        let filter = DownloadFilter {
            category: parse_category(params.category.as_deref())?,
            build_id: params.build_id,
        };

        let entries = self.manager.list_downloads(filter).await?;
        tracing::debug!("Listed {} downloads", entries.len());

        format::downloads(&entries, OutputFormat::from_arg(params.format.as_deref()))
    }

    async fn handle_cleanup_downloads(&self, arguments: Option<Value>) -> Result<String> {
        let params: CleanupDownloadsParams = parse_arguments(arguments)?;
        let filter = CleanupFilter {
            category: parse_category(params.category.as_deref())?,
            build_id: params.build_id,
            older_than: params.older_than_ms.map(Duration::from_millis),
        };

        let report = self.manager.cleanup_downloads(filter).await?;
        format::cleanup_report(&report, OutputFormat::from_arg(params.format.as_deref()))
    }

    async fn handle_get_download_location(&self, arguments: Option<Value>) -> Result<String> {
        let params: LocationParams = parse_arguments(arguments)?;
        let info = LocationInfo {
            location: self.manager.location(),
            exists: self.manager.root_exists().await,
            pid: self.manager.pid(),
        };
        format::location(&info, OutputFormat::from_arg(params.format.as_deref()))
    }
}

/// Missing or `null` arguments mean "all defaults".
fn parse_arguments<T: Default + for<'de> Deserialize<'de>>(arguments: Option<Value>) -> Result<T> {
    match arguments {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => Ok(serde_json::from_value(value)?),
    }
}

fn parse_category(raw: Option<&str>) -> Result<Option<DownloadCategory>> {
    raw.map(str::parse).transpose()
}

/// Parameters for list_downloads tool.
#[derive(Debug, Default, Deserialize)]
struct ListDownloadsParams {
    category: Option<String>,
    build_id: Option<u64>,
    format: Option<String>,
}

/// Parameters for cleanup_downloads tool.
#[derive(Debug, Default, Deserialize)]
struct CleanupDownloadsParams {
    category: Option<String>,
    build_id: Option<u64>,
    older_than_ms: Option<u64>,
    format: Option<String>,
}

/// Parameters for get_download_location tool.
#[derive(Debug, Default, Deserialize)]
struct LocationParams {
    format: Option<String>,
}
