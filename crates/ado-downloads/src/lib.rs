//! Process-scoped download staging for ado-mcp-tools.
//!
//! Build logs and artifacts fetched by the server are staged under a
//! per-process root in the platform temp directory:
//!
//! ```text
//! {tmp}/ado-mcp-server-{pid}/downloads/{category}/{build_id}/{filename}
//! ```
//!
//! The [`TempDownloadManager`] decides where each download goes, remembers
//! what it staged, lists and cleans up staged files, and purges roots left
//! behind by earlier server processes that never ran their shutdown path.
//!
//! # Example
//!
//! ```ignore
//! use ado_downloads::{DownloadCategory, DownloadEntry, TempDownloadManager};
//!
//! let manager = TempDownloadManager::new(&config.downloads);
//! manager.purge_stale_roots().await;
//!
//! let target = manager
//!     .resolve_output_path(DownloadCategory::JobLogs, 4711, "build.log", None)
//!     .await?;
//! tokio::fs::write(&target.path, bytes).await?;
//!
//! let entry = DownloadEntry::from_file(&target, 4711, DownloadCategory::JobLogs).await?;
//! manager.record_download(entry);
//! ```

pub mod category;
pub mod clock;
pub mod entry;
pub mod guard;
pub mod manager;
pub mod purge;

pub use category::DownloadCategory;
pub use clock::{Clock, SystemClock};
pub use entry::{CleanupFailure, CleanupFilter, CleanupReport, DownloadEntry, DownloadFilter, ResolvedPath};
pub use guard::RootCleanupGuard;
pub use manager::TempDownloadManager;

/// Name of the directory under each root that holds the category folders.
pub const DOWNLOADS_DIR_NAME: &str = "downloads";
