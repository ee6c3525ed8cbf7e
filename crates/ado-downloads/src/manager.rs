//! The temp download manager.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};

use ado_core::{DownloadsConfig, Error, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::category::DownloadCategory;
use crate::clock::{Clock, SystemClock};
use crate::entry::{CleanupFilter, CleanupReport, DownloadEntry, DownloadFilter, ResolvedPath};
use crate::guard::RootCleanupGuard;
use crate::purge;
use crate::DOWNLOADS_DIR_NAME;

/// Owns the per-process download staging tree.
///
/// One manager exists per server process and is shared with the tool layer
/// through an `Arc`. The root directory is only created once something is
/// staged.
pub struct TempDownloadManager {
    temp_dir: PathBuf,
    prefix: String,
    pid: u32,
    root: PathBuf,
    stale_after: Duration,
    clock: Arc<dyn Clock>,
    registry: RwLock<HashMap<PathBuf, DownloadEntry>>,
}

impl TempDownloadManager {
    /// Create a manager for the current process.
    pub fn new(config: &DownloadsConfig) -> Self {
        Self::with_pid(config, std::process::id())
    }

    /// Create a manager whose root is named after `pid`.
    pub fn with_pid(config: &DownloadsConfig, pid: u32) -> Self {
        let temp_dir = config.temp_dir();
        let root = temp_dir.join(purge::root_dir_name(&config.root_prefix, pid));
        Self {
            temp_dir,
            prefix: config.root_prefix.clone(),
            pid,
            root,
            stale_after: config.stale_after(),
            clock: Arc::new(SystemClock),
            registry: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Root directory of this process's staging area.
    pub fn location(&self) -> &Path {
        &self.root
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// `{root}/downloads`
    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join(DOWNLOADS_DIR_NAME)
    }

    /// `{root}/downloads/{category}/{build_id}`
    pub fn build_dir(&self, category: DownloadCategory, build_id: u64) -> PathBuf {
        self.downloads_dir()
            .join(category.as_str())
            .join(build_id.to_string())
    }

    pub async fn root_exists(&self) -> bool {
        tokio::fs::try_exists(&self.root).await.unwrap_or(false)
    }

    /// Guard that removes the root synchronously when dropped.
    pub fn cleanup_guard(&self) -> RootCleanupGuard {
        RootCleanupGuard::new(&self.root)
    }

    /// Number of downloads recorded in this process.
    pub fn recorded_count(&self) -> usize {
        self.registry_read().len()
    }

    // =========================================================================
    // Path resolution
    // =========================================================================

    /// Decide where a download should be written and make sure its directory
    /// exists.
    ///
    /// With an explicit output path, a trailing separator or an existing
    /// directory means "put the file in here"; anything else is the exact
    /// destination. Without one, the file goes to
    /// `{root}/downloads/{category}/{build_id}/{suggested_filename}`.
    pub async fn resolve_output_path(
        &self,
        category: DownloadCategory,
        build_id: u64,
        suggested_filename: &str,
        explicit_output_path: Option<&str>,
    ) -> Result<ResolvedPath> {
        validate_file_name(suggested_filename)?;

        let resolved = match explicit_output_path {
            Some(raw) => self.resolve_explicit(raw, suggested_filename).await?,
            None => {
                let dir = self.build_dir(category, build_id);
                create_dir(&dir).await?;
                ResolvedPath {
                    path: dir.join(suggested_filename),
                    temporary: true,
                }
            }
        };

        debug!(
            path = %resolved.path.display(),
            category = %category,
            build_id,
            temporary = resolved.temporary,
            "Resolved download path"
        );
        Ok(resolved)
    }

    async fn resolve_explicit(&self, raw: &str, suggested_filename: &str) -> Result<ResolvedPath> {
        if raw.trim().is_empty() {
            return Err(Error::InvalidPath("output path is empty".to_string()));
        }

        let names_directory = raw.chars().last().is_some_and(std::path::is_separator);
        let path = absolutize(Path::new(raw))?;

        let is_dir = names_directory
            || tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);

        let path = if is_dir {
            create_dir(&path).await?;
            path.join(suggested_filename)
        } else {
            if let Some(parent) = path.parent() {
                create_dir(parent).await?;
            }
            path
        };

        // A destination inside our own root is removed with the root, so it
        // is managed like any other staged file.
        let temporary = path.starts_with(absolutize(&self.root)?);

        Ok(ResolvedPath { path, temporary })
    }

    // =========================================================================
    // Registry and listing
    // =========================================================================

    /// Remember a completed download. Recording the same path again replaces
    /// the earlier entry.
    pub fn record_download(&self, entry: DownloadEntry) {
        debug!(
            path = %entry.path.display(),
            build_id = entry.build_id,
            size = entry.size,
            "Recorded download"
        );
        self.registry_write().insert(entry.path.clone(), entry);
    }

    /// List staged downloads as they currently exist on disk.
    ///
    /// Files under the managed tree are included whether or not they were
    /// recorded; recorded files that have since disappeared are dropped.
    /// User-chosen locations are listed while their files still exist.
    pub async fn list_downloads(&self, filter: DownloadFilter) -> Result<Vec<DownloadEntry>> {
        let scan = self.scan(filter).await?;
        let on_disk: HashSet<&Path> = scan.files.iter().map(|f| f.path.as_path()).collect();

        let mut results = Vec::with_capacity(scan.files.len());
        let mut gone = Vec::new();
        let mut outside_scan = Vec::new();
        {
            let registry = self.registry_read();
            for file in &scan.files {
                let entry = match registry.get(&file.path) {
                    Some(recorded) => DownloadEntry {
                        size: file.size,
                        ..recorded.clone()
                    },
                    None => file.to_entry(),
                };
                results.push(entry);
            }

            for (path, entry) in registry.iter() {
                if !filter.matches(entry.category, entry.build_id)
                    || on_disk.contains(path.as_path())
                {
                    continue;
                }
                if entry.temporary && self.is_in_layout(path) {
                    gone.push(path.clone());
                } else {
                    outside_scan.push(entry.clone());
                }
            }
        }

        for entry in outside_scan {
            match tokio::fs::metadata(&entry.path).await {
                Ok(m) if m.is_file() => results.push(DownloadEntry {
                    size: m.len(),
                    ..entry
                }),
                _ => gone.push(entry.path),
            }
        }

        if !gone.is_empty() {
            debug!(count = gone.len(), "Dropping recorded downloads that no longer exist");
            let mut registry = self.registry_write();
            for path in &gone {
                registry.remove(path);
            }
        }

        results.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(results)
    }

    // =========================================================================
    // Cleanup
    // =========================================================================

    /// Delete staged files matching `filter`.
    ///
    /// Only files under the managed root are touched. Build and category
    /// directories left empty are removed too. A file that cannot be deleted
    /// is reported in the result and does not stop the rest.
    pub async fn cleanup_downloads(&self, filter: CleanupFilter) -> Result<CleanupReport> {
        let scan = self.scan(filter.scope()).await?;
        let now = self.clock.now();

        let recorded_at: HashMap<PathBuf, DateTime<Utc>> = {
            let registry = self.registry_read();
            scan.files
                .iter()
                .filter_map(|f| registry.get(&f.path).map(|e| (f.path.clone(), e.created_at)))
                .collect()
        };

        let mut report = CleanupReport::default();
        let mut removed_paths = Vec::new();

        for file in &scan.files {
            if let Some(min_age) = filter.older_than {
                let created = recorded_at
                    .get(&file.path)
                    .copied()
                    .or_else(|| file.modified.map(DateTime::<Utc>::from));
                let Some(created) = created else {
                    debug!(path = %file.path.display(), "Unknown file age, keeping");
                    continue;
                };
                if age_at(now, created) < min_age {
                    continue;
                }
            }

            match tokio::fs::remove_file(&file.path).await {
                Ok(()) => {
                    debug!(path = %file.path.display(), "Removed download");
                    report.removed += 1;
                    report.freed_bytes += file.size;
                    removed_paths.push(file.path.clone());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    removed_paths.push(file.path.clone());
                }
                Err(e) => {
                    warn!(path = %file.path.display(), error = %e, "Failed to remove download");
                    report.fail(&file.path, e);
                }
            }
        }

        let mut category_dirs = BTreeSet::new();
        for dir in &scan.build_dirs {
            if let Some(parent) = dir.parent() {
                category_dirs.insert(parent.to_path_buf());
            }
            remove_dir_if_empty(dir, &mut report).await;
        }
        for dir in &category_dirs {
            remove_dir_if_empty(dir, &mut report).await;
        }

        if !removed_paths.is_empty() {
            let mut registry = self.registry_write();
            for path in &removed_paths {
                registry.remove(path);
            }
        }

        if report.is_clean() {
            info!(
                removed = report.removed,
                removed_dirs = report.removed_dirs,
                freed_bytes = report.freed_bytes,
                "Download cleanup completed"
            );
        } else {
            warn!(
                removed = report.removed,
                failures = report.failures.len(),
                "Download cleanup completed with errors"
            );
        }

        Ok(report)
    }

    /// Remove download roots left behind by earlier processes.
    ///
    /// Returns how many roots were removed. Failures are logged and never
    /// returned, so startup always proceeds.
    pub async fn purge_stale_roots(&self) -> usize {
        let now = self.clock.now();
        let stale = match purge::find_stale_roots(
            &self.temp_dir,
            &self.prefix,
            self.pid,
            self.stale_after,
            now,
        )
        .await
        {
            Ok(stale) => stale,
            Err(e) => {
                warn!(error = %e, "Failed to scan for stale download roots");
                return 0;
            }
        };

        let mut removed = 0;
        for root in stale {
            match tokio::fs::remove_dir_all(&root.path).await {
                Ok(()) => {
                    removed += 1;
                    info!(
                        path = %root.path.display(),
                        pid = root.pid,
                        age_hours = root.age.as_secs() / 3600,
                        "Purged stale download root"
                    );
                }
                // Another instance got there first
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %root.path.display(), error = %e, "Failed to purge stale download root");
                }
            }
        }

        if removed > 0 {
            info!(removed, "Stale download roots purged");
        }
        removed
    }

    /// Remove this process's root and everything in it.
    ///
    /// Returns `false` if there was nothing to remove.
    pub async fn remove_root(&self) -> Result<bool> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {
                self.registry_write().retain(|_, e| !e.temporary);
                info!(path = %self.root.display(), "Removed download root");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::filesystem(&self.root, e)),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn scan(&self, filter: DownloadFilter) -> Result<Scan> {
        let downloads_dir = self.downloads_dir();
        tokio::task::spawn_blocking(move || scan_downloads(&downloads_dir, filter))
            .await
            .map_err(|e| Error::Other(anyhow::anyhow!("download scan task failed: {}", e)))
    }

    /// Whether `path` sits at `downloads/{category}/{build_id}/{file}`,
    /// where the disk scan finds it.
    fn is_in_layout(&self, path: &Path) -> bool {
        path.strip_prefix(self.downloads_dir())
            .map(|relative| relative.components().count() == 3)
            .unwrap_or(false)
    }

    fn registry_read(&self) -> RwLockReadGuard<'_, HashMap<PathBuf, DownloadEntry>> {
        self.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn registry_write(&self) -> RwLockWriteGuard<'_, HashMap<PathBuf, DownloadEntry>> {
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for TempDownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempDownloadManager")
            .field("root", &self.root)
            .field("stale_after", &self.stale_after)
            .field("recorded", &self.recorded_count())
            .finish()
    }
}

/// A file found under `downloads/{category}/{build_id}/`.
#[derive(Debug)]
struct ScannedFile {
    path: PathBuf,
    category: DownloadCategory,
    build_id: u64,
    size: u64,
    modified: Option<SystemTime>,
}

impl ScannedFile {
    fn to_entry(&self) -> DownloadEntry {
        DownloadEntry {
            path: self.path.clone(),
            build_id: self.build_id,
            category: self.category,
            created_at: self
                .modified
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(Utc::now),
            size: self.size,
            temporary: true,
        }
    }
}

#[derive(Debug, Default)]
struct Scan {
    files: Vec<ScannedFile>,
    build_dirs: Vec<PathBuf>,
}

/// Walk `downloads/{category}/{build_id}/{file}`, skipping anything that
/// does not fit the layout. Symlinks are not followed.
fn scan_downloads(downloads_dir: &Path, filter: DownloadFilter) -> Scan {
    let mut scan = Scan::default();
    if !downloads_dir.is_dir() {
        return scan;
    }

    for entry in WalkDir::new(downloads_dir).min_depth(2).max_depth(3) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "Skipping unreadable entry in download tree");
                continue;
            }
        };

        let Ok(relative) = entry.path().strip_prefix(downloads_dir) else {
            continue;
        };
        let parts: Vec<&str> = relative
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect();
        if parts.len() != entry.depth() {
            continue;
        }

        let Ok(category) = parts[0].parse::<DownloadCategory>() else {
            continue;
        };
        let Ok(build_id) = parts[1].parse::<u64>() else {
            continue;
        };
        if !filter.matches(category, build_id) {
            continue;
        }

        let file_type = entry.file_type();
        if entry.depth() == 2 && file_type.is_dir() {
            scan.build_dirs.push(entry.path().to_path_buf());
        } else if entry.depth() == 3 && file_type.is_file() {
            let metadata = entry.metadata().ok();
            scan.files.push(ScannedFile {
                path: entry.path().to_path_buf(),
                category,
                build_id,
                size: metadata.as_ref().map_or(0, |m| m.len()),
                modified: metadata.and_then(|m| m.modified().ok()),
            });
        }
    }

    scan
}

/// Reject anything that is not a single plain file name.
fn validate_file_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(()),
        _ => Err(Error::InvalidPath(format!(
            "'{}' is not a plain file name",
            name
        ))),
    }
}

/// Make `path` absolute against the working directory and drop `.` parts.
fn absolutize(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| Error::filesystem(path, e))?
            .join(path)
    };
    Ok(joined.components().collect())
}

async fn create_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::filesystem(dir, e))
}

async fn remove_dir_if_empty(dir: &Path, report: &mut CleanupReport) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            report.fail(dir, e);
            return;
        }
    };
    match entries.next_entry().await {
        Ok(None) => {}
        Ok(Some(_)) => return,
        Err(e) => {
            report.fail(dir, e);
            return;
        }
    }

    match tokio::fs::remove_dir(dir).await {
        Ok(()) => {
            debug!(path = %dir.display(), "Removed empty download directory");
            report.removed_dirs += 1;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Failed to remove download directory");
            report.fail(dir, e);
        }
    }
}

fn age_at(now: DateTime<Utc>, then: DateTime<Utc>) -> Duration {
    now.signed_duration_since(then)
        .to_std()
        .unwrap_or(Duration::ZERO)
}
