//! Rendering of tool results.
//!
//! Markdown by default, JSON on request.

use std::path::Path;

use ado_core::Result;
use ado_downloads::{CleanupReport, DownloadEntry};
use serde::Serialize;

/// Output format of a tool result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
}

impl OutputFormat {
    /// Parse the `format` tool argument. Unknown values fall back to Markdown.
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            Some("json") => OutputFormat::Json,
            _ => OutputFormat::Markdown,
        }
    }
}

/// Location details returned by `get_download_location`.
#[derive(Debug, Clone, Serialize)]
pub struct LocationInfo<'a> {
    pub location: &'a Path,
    pub exists: bool,
    pub pid: u32,
}

pub fn downloads(entries: &[DownloadEntry], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(entries)?),
        OutputFormat::Markdown => Ok(downloads_to_markdown(entries)),
    }
}

pub fn cleanup_report(report: &CleanupReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Markdown => Ok(cleanup_report_to_markdown(report)),
    }
}

pub fn location(info: &LocationInfo<'_>, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(info)?),
        OutputFormat::Markdown => {
            let state = if info.exists {
                "exists"
            } else {
                "not created yet"
            };
            Ok(format!(
                "Downloads are staged in `{}` ({}).",
                info.location.display(),
                state
            ))
        }
    }
}

/// Convert staged downloads to a Markdown table.
pub fn downloads_to_markdown(entries: &[DownloadEntry]) -> String {
    if entries.is_empty() {
        return "No downloads found.".to_string();
    }

    let total: u64 = entries.iter().map(|e| e.size).sum();
    let mut output = format!(
        "# Downloads ({} files, {})\n\n",
        entries.len(),
        human_size(total)
    );
    output.push_str("| Build | Category | File | Size | Created | Path |\n");
    output.push_str("|-------|----------|------|------|---------|------|\n");

    for entry in entries {
        let file = if entry.temporary {
            entry.file_name()
        } else {
            format!("{} (user path)", entry.file_name())
        };
        output.push_str(&format!(
            "| {} | {} | {} | {} | {} | `{}` |\n",
            entry.build_id,
            entry.category,
            file,
            human_size(entry.size),
            entry.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            entry.path.display()
        ));
    }

    output
}

pub fn cleanup_report_to_markdown(report: &CleanupReport) -> String {
    let mut output = format!(
        "Removed {} file(s) ({}) and {} empty director{}.",
        report.removed,
        human_size(report.freed_bytes),
        report.removed_dirs,
        if report.removed_dirs == 1 { "y" } else { "ies" }
    );

    if !report.failures.is_empty() {
        output.push_str(&format!(
            "\n\n**{} item(s) could not be removed:**\n",
            report.failures.len()
        ));
        for failure in &report.failures {
            output.push_str(&format!(
                "- `{}`: {}\n",
                failure.path.display(),
                failure.error
            ));
        }
    }

    output
}

/// Human readable byte count (binary units).
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
