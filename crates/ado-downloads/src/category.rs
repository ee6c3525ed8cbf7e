//! Download categories.

use std::fmt;
use std::str::FromStr;

use ado_core::Error;
use serde::{Deserialize, Serialize};

/// Subdirectory a download is filed under.
///
/// The string forms double as directory names and as the tags the tool layer
/// accepts, so they must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadCategory {
    /// Logs fetched by step or task name
    LogsByName,
    /// Full logs of a pipeline job
    JobLogs,
    /// Build artifacts
    Artifacts,
}

impl DownloadCategory {
    /// All categories, in directory listing order.
    pub const ALL: [DownloadCategory; 3] = [
        DownloadCategory::LogsByName,
        DownloadCategory::JobLogs,
        DownloadCategory::Artifacts,
    ];

    /// Directory name / tag of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadCategory::LogsByName => "logs-by-name",
            DownloadCategory::JobLogs => "job-logs",
            DownloadCategory::Artifacts => "artifacts",
        }
    }
}

impl fmt::Display for DownloadCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                Error::InvalidPath(format!(
                    "Unknown download category '{}'. Expected one of: logs-by-name, job-logs, artifacts",
                    s
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_categories() {
        for category in DownloadCategory::ALL {
            let parsed: DownloadCategory = category.as_str().parse().unwrap();
            assert_eq!(parsed, category);
        }
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert!("Artifacts".parse::<DownloadCategory>().is_err());
        assert!("job_logs".parse::<DownloadCategory>().is_err());
        assert!("".parse::<DownloadCategory>().is_err());
    }

    #[test]
    fn test_serde_matches_directory_names() {
        let json = serde_json::to_string(&DownloadCategory::LogsByName).unwrap();
        assert_eq!(json, "\"logs-by-name\"");

        let parsed: DownloadCategory = serde_json::from_str("\"job-logs\"").unwrap();
        assert_eq!(parsed, DownloadCategory::JobLogs);
    }

    #[test]
    fn test_display() {
        assert_eq!(DownloadCategory::Artifacts.to_string(), "artifacts");
    }
}
