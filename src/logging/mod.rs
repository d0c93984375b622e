//! Console and log file output for a verb run.
//!
//! Work on each path happens inside a span with a `path` field; outcomes are
//! collected by [`Logger`] and reported once at the end.

mod logger;
mod subscriber;
mod types;
mod utils;

pub use logger::Logger;
pub use subscriber::init_subscriber;
pub use types::{FileEntry, FileStatus};

/// A [`Logger`] for `verb` whose events go to a fresh log file in a
/// temporary directory, through a thread-local subscriber.
///
/// Keep the returned guard alive for the duration of the test.
#[cfg(test)]
#[allow(clippy::expect_used)]
pub(crate) fn isolated_logger(
    verb: crate::marble::Verb,
) -> (Logger, tempfile::TempDir, tracing::dispatcher::DefaultGuard) {
    use tracing_subscriber::{Layer as _, filter::LevelFilter, layer::SubscriberExt as _};

    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let path = tmp.path().join(format!("{verb}.log"));
    let file_layer = subscriber::FileLayer::create(&path, verb, tmp.path())
        .expect("failed to create log file");
    let subscriber =
        tracing_subscriber::registry().with(file_layer.with_filter(LevelFilter::DEBUG));
    let guard = tracing::dispatcher::set_default(&tracing::Dispatch::new(subscriber));
    (Logger::with_log_file(verb, Some(path)), tmp, guard)
}
