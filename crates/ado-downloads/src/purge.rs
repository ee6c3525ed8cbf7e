//! Detection of download roots abandoned by earlier server processes.
//!
//! Every server process stages downloads under `{prefix}-{pid}` in the temp
//! directory. A process killed before its shutdown path ran leaves that
//! directory behind. On startup the sibling roots are scanned and any root
//! whose newest entry is older than the staleness threshold is reported.
//!
//! The embedded pid is not probed for liveness; age is the only criterion.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use ado_core::{Error, Result};
use chrono::{DateTime, Utc};
use tracing::debug;
use walkdir::WalkDir;

/// Directory name of the root owned by `pid`.
pub fn root_dir_name(prefix: &str, pid: u32) -> String {
    format!("{}-{}", prefix, pid)
}

/// Extract the pid from a root directory name, if it follows the pattern.
pub fn parse_root_pid(name: &str, prefix: &str) -> Option<u32> {
    let digits = name.strip_prefix(prefix)?.strip_prefix('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// A sibling root judged stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleRoot {
    pub path: PathBuf,
    pub pid: u32,
    /// Time since anything under the root was last modified
    pub age: Duration,
}

/// Scan `temp_dir` for roots named `{prefix}-{pid}` that are older than
/// `stale_after`. The root of `own_pid` is never returned.
pub async fn find_stale_roots(
    temp_dir: &Path,
    prefix: &str,
    own_pid: u32,
    stale_after: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<StaleRoot>> {
    let mut entries = tokio::fs::read_dir(temp_dir)
        .await
        .map_err(|e| Error::filesystem(temp_dir, e))?;

    let mut candidates = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => return Err(Error::filesystem(temp_dir, e)),
        };

        let name = entry.file_name();
        let Some(pid) = parse_root_pid(&name.to_string_lossy(), prefix) else {
            continue;
        };
        if pid == own_pid {
            continue;
        }

        // file_type() does not follow symlinks, so a link named like a root
        // is never treated as one.
        match entry.file_type().await {
            Ok(ft) if ft.is_dir() => candidates.push((entry.path(), pid)),
            Ok(_) => debug!(path = %entry.path().display(), "Skipping non-directory root candidate"),
            Err(e) => debug!(path = %entry.path().display(), error = %e, "Cannot stat root candidate"),
        }
    }

    let mut stale = Vec::new();
    for (path, pid) in candidates {
        let scan_path = path.clone();
        let newest = tokio::task::spawn_blocking(move || newest_modification(&scan_path))
            .await
            .map_err(|e| Error::Other(anyhow::anyhow!("root scan task failed: {}", e)))?;

        let Some(newest) = newest else {
            debug!(path = %path.display(), "Root vanished or is unreadable, skipping");
            continue;
        };

        let age = now
            .signed_duration_since(DateTime::<Utc>::from(newest))
            .to_std()
            .unwrap_or(Duration::ZERO);

        if age >= stale_after {
            stale.push(StaleRoot { path, pid, age });
        } else {
            debug!(path = %path.display(), age_secs = age.as_secs(), "Root is still fresh");
        }
    }

    stale.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(stale)
}

/// Most recent modification time of `root` or anything below it.
fn newest_modification(root: &Path) -> Option<SystemTime> {
    let mut newest: Option<SystemTime> = None;
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if let Ok(modified) = metadata.modified() {
            newest = Some(newest.map_or(modified, |n| n.max(modified)));
        }
    }
    newest
}
