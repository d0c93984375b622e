//! The five marble verbs (`collect`, `drop`, `project`, `materialize`,
//! `touch`) as seen from the command line.
use anyhow::{Context as _, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::{FilesOpts, GlobalOpts};
use crate::exec::SystemExecutor;
use crate::logging::{FileStatus, Logger};
use crate::marble::{RealityMarble, Verb};

/// Open the marble and run `verb` on every file.
///
/// # Errors
///
/// Returns an error only if the marble itself cannot be opened. Per-file
/// failures are logged and summarized instead.
pub fn run(global: &GlobalOpts, verb: Verb, opts: &FilesOpts, log: &Logger) -> Result<()> {
    let marble = RealityMarble::open(&global.reality_marble, Arc::new(SystemExecutor))
        .with_context(|| {
            format!(
                "opening reality marble at {}",
                global.reality_marble.display()
            )
        })?;
    if global.debug {
        marble.dump_config();
    }
    apply_to_all(&marble, verb, &opts.files, log);
    log.print_summary();
    Ok(())
}

/// Run `verb` on each file in order, recording one entry per file.
///
/// A failing file never stops the remaining ones.
pub fn apply_to_all(marble: &RealityMarble, verb: Verb, files: &[PathBuf], log: &Logger) {
    for file in files {
        let shown = file.display().to_string();
        let _span = tracing::info_span!("file", path = %shown).entered();
        match marble.apply(verb, file) {
            Ok(outcome) => {
                tracing::debug!("{verb}: {outcome:?}");
                log.record(&shown, FileStatus::from(outcome), None);
            }
            Err(e) => {
                tracing::error!(path = %shown, "{verb} failed: {e}");
                log.record(&shown, FileStatus::Failed, Some(&e.to_string()));
            }
        }
    }
}
