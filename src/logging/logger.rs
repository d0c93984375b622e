//! Per-path outcome collection and the end-of-run summary.
use std::path::PathBuf;
use std::sync::Mutex;

use super::types::{FileEntry, FileStatus};
use super::utils::log_file_path;
use crate::marble::Verb;

/// Records one [`FileEntry`] per processed path and reports them at the end
/// of a verb run.
///
/// The summary goes through [`tracing`]: each row carries a `status` field,
/// which the console renders as an icon and the log file as a word.
#[derive(Debug)]
pub struct Logger {
    verb: Verb,
    entries: Mutex<Vec<FileEntry>>,
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Logger for `verb`, pointing at the default log file.
    ///
    /// The file itself is created by
    /// [`init_subscriber`](super::subscriber::init_subscriber).
    #[must_use]
    pub fn new(verb: Verb) -> Self {
        Self::with_log_file(verb, log_file_path(verb))
    }

    /// Logger for `verb` that reports `log_file` in its summary.
    #[must_use]
    pub const fn with_log_file(verb: Verb, log_file: Option<PathBuf>) -> Self {
        Self {
            verb,
            entries: Mutex::new(Vec::new()),
            log_file,
        }
    }

    /// Where this run is logged, if anywhere.
    #[must_use]
    pub const fn log_file(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Snapshot of the recorded entries, in processing order.
    #[must_use]
    pub fn entries(&self) -> Vec<FileEntry> {
        self.entries.lock().map_or_else(|_| vec![], |g| g.clone())
    }

    /// Record the outcome for one path.
    pub fn record(&self, path: &str, status: FileStatus, message: Option<&str>) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.push(FileEntry {
                path: path.to_string(),
                status,
                message: message.map(String::from),
            });
        }
    }

    /// Number of paths the verb failed on.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.count(FileStatus::Failed)
    }

    fn count(&self, status: FileStatus) -> usize {
        self.entries
            .lock()
            .map_or(0, |guard| guard.iter().filter(|e| e.status == status).count())
    }

    /// Emit one row per path followed by the totals. Nothing is emitted
    /// for a run without paths.
    pub fn print_summary(&self) {
        let entries = self.entries();
        if entries.is_empty() {
            return;
        }

        for entry in &entries {
            match &entry.message {
                Some(msg) => tracing::info!(status = %entry.status, "{} ({msg})", entry.path),
                None => tracing::info!(status = %entry.status, "{}", entry.path),
            }
        }

        tracing::info!(
            "{}: {} file(s), {} ok, {} unchanged, {} failed",
            self.verb,
            entries.len(),
            self.count(FileStatus::Ok),
            self.count(FileStatus::AlreadyCorrect),
            self.failure_count(),
        );
        if let Some(path) = &self.log_file {
            tracing::info!("log: {}", path.display());
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::logging::isolated_logger;
    use std::fs;

    #[test]
    fn record_keeps_order_and_message() {
        let (log, _tmp, _guard) = isolated_logger(Verb::Collect);
        assert!(log.entries().is_empty());
        log.record("~/.vimrc", FileStatus::Ok, None);
        log.record("/etc/hosts", FileStatus::Failed, Some("permission denied"));
        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "~/.vimrc");
        assert_eq!(entries[1].message.as_deref(), Some("permission denied"));
    }

    #[test]
    fn failure_count_ignores_unchanged() {
        let (log, _tmp, _guard) = isolated_logger(Verb::Project);
        assert_eq!(log.failure_count(), 0);
        log.record("a", FileStatus::Ok, None);
        log.record("b", FileStatus::AlreadyCorrect, None);
        log.record("c", FileStatus::Failed, Some("x"));
        log.record("d", FileStatus::Failed, Some("y"));
        assert_eq!(log.failure_count(), 2);
    }

    #[test]
    fn empty_run_writes_no_summary() {
        let (log, _tmp, _guard) = isolated_logger(Verb::Touch);
        log.print_summary();
        let contents = fs::read_to_string(log.log_file().unwrap()).unwrap();
        assert!(!contents.contains("file(s)"));
    }

    #[test]
    fn events_inside_a_path_span_are_prefixed() {
        let (log, _tmp, _guard) = isolated_logger(Verb::Drop);
        tracing::info_span!("file", path = "~/.profile").in_scope(|| {
            tracing::warn!("rolling back 1 step(s)");
            tracing::debug!("materialize done");
        });
        tracing::error!("outside any path");
        let contents = fs::read_to_string(log.log_file().unwrap()).unwrap();
        assert!(contents.contains("[warn] ~/.profile: rolling back 1 step(s)"));
        assert!(contents.contains("[debug] ~/.profile: materialize done"));
        assert!(contents.contains("[error] outside any path"));
    }

    #[test]
    fn summary_rows_are_plain_in_file() {
        let (log, _tmp, _guard) = isolated_logger(Verb::Collect);
        log.record("~/.bashrc", FileStatus::Ok, None);
        log.record("~/.zshrc", FileStatus::Failed, Some("not managed"));
        log.print_summary();
        let contents = fs::read_to_string(log.log_file().unwrap()).unwrap();
        assert!(contents.contains("] ok        ~/.bashrc\n"));
        assert!(contents.contains("] failed    ~/.zshrc (not managed)\n"));
        assert!(contents.contains("collect: 2 file(s), 1 ok, 0 unchanged, 1 failed"));
        assert!(!contents.contains('\x1b'));
    }
}
