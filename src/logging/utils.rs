//! Log file location and timestamps.
use std::fs;
use std::path::PathBuf;

use crate::marble::Verb;

/// `$XDG_CACHE_HOME/realitymarble`, falling back to `~/.cache/realitymarble`.
/// Created on demand; `None` if that fails.
pub(super) fn log_dir() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CACHE_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| crate::paths::home_dir().ok().map(|home| home.join(".cache")))?;
    let dir = base.join("realitymarble");
    fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// One log file per verb, overwritten by each run of that verb.
pub(super) fn log_file_path(verb: Verb) -> Option<PathBuf> {
    Some(log_dir()?.join(format!("{verb}.log")))
}

/// Run start for the log header, e.g. `2026-10-18 09:30:00 UTC`.
pub(super) fn start_time() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Per-line clock, `HH:MM:SS` UTC.
pub(super) fn clock_time() -> String {
    chrono::Utc::now().format("%H:%M:%S").to_string()
}
