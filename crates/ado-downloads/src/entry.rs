//! Staged download records, filters and cleanup results.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ado_core::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::DownloadCategory;

/// Where a download should be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPath {
    /// Absolute destination file path; its parent directory exists
    pub path: PathBuf,
    /// True when the path lives under the managed root
    pub temporary: bool,
}

/// A single staged file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadEntry {
    pub path: PathBuf,
    pub build_id: u64,
    pub category: DownloadCategory,
    pub created_at: DateTime<Utc>,
    pub size: u64,
    /// Managed by the staging area (as opposed to a user-chosen location)
    pub temporary: bool,
}

impl DownloadEntry {
    /// Build an entry for a file that has just been written to `target`.
    pub async fn from_file(
        target: &ResolvedPath,
        build_id: u64,
        category: DownloadCategory,
    ) -> Result<Self> {
        let metadata = tokio::fs::metadata(&target.path)
            .await
            .map_err(|e| Error::filesystem(&target.path, e))?;

        if !metadata.is_file() {
            return Err(Error::InvalidPath(format!(
                "{} is not a file",
                target.path.display()
            )));
        }

        Ok(Self {
            path: target.path.clone(),
            build_id,
            category,
            created_at: Utc::now(),
            size: metadata.len(),
            temporary: target.temporary,
        })
    }

    /// File name component of the path.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Narrows listings to a category and/or build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadFilter {
    pub category: Option<DownloadCategory>,
    pub build_id: Option<u64>,
}

impl DownloadFilter {
    /// Filter for everything staged for one build.
    pub fn for_build(build_id: u64) -> Self {
        Self {
            build_id: Some(build_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, category: DownloadCategory, build_id: u64) -> bool {
        self.category.map_or(true, |c| c == category)
            && self.build_id.map_or(true, |b| b == build_id)
    }
}

/// Selects what `cleanup_downloads` removes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupFilter {
    pub category: Option<DownloadCategory>,
    pub build_id: Option<u64>,
    /// Only remove files at least this old
    pub older_than: Option<Duration>,
}

impl CleanupFilter {
    /// Filter for everything staged for one build.
    pub fn for_build(build_id: u64) -> Self {
        Self {
            build_id: Some(build_id),
            ..Default::default()
        }
    }

    /// The category/build part of this filter.
    pub fn scope(&self) -> DownloadFilter {
        DownloadFilter {
            category: self.category,
            build_id: self.build_id,
        }
    }
}

/// A file or directory that could not be removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Aggregate outcome of a cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Files removed
    pub removed: usize,
    /// Bytes freed by the removed files
    pub freed_bytes: u64,
    /// Empty build/category directories removed
    pub removed_dirs: usize,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn fail(&mut self, path: &Path, error: impl ToString) {
        self.failures.push(CleanupFailure {
            path: path.to_path_buf(),
            error: error.to_string(),
        });
    }
}
