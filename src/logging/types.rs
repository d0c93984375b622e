//! Per-file outcome records for the end-of-run summary.
use std::fmt;

/// Outcome of one verb on one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// The path as given on the command line.
    pub path: String,
    /// Final status.
    pub status: FileStatus,
    /// Optional detail, usually the error description.
    pub message: Option<String>,
}

/// Status of a processed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// The verb changed the filesystem.
    Ok,
    /// Nothing needed to change.
    AlreadyCorrect,
    /// The verb failed; any partial work was rolled back.
    Failed,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "ok",
            Self::AlreadyCorrect => "unchanged",
            Self::Failed => "failed",
        })
    }
}

impl FileStatus {
    /// Parse the label written by [`fmt::Display`].
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "ok" => Some(Self::Ok),
            "unchanged" => Some(Self::AlreadyCorrect),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Console icon and ANSI colour for a summary row.
    #[must_use]
    pub const fn style(self) -> (&'static str, &'static str) {
        match self {
            Self::Ok => ("✓", "\x1b[32m"),
            Self::AlreadyCorrect => ("·", "\x1b[2m"),
            Self::Failed => ("✗", "\x1b[31m"),
        }
    }
}
