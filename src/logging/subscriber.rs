//! Tracing subscriber setup for a verb run.
//!
//! Each processed path runs inside a span carrying a `path` field.
//! The file layer prefixes every event in that span with the path, so a log
//! line can be traced back to the argument that produced it without every
//! call site repeating it. Summary rows carry a `status` field instead of
//! baked-in colours; the console styles them and the log file keeps them as
//! plain words.
use std::fs;
use std::io::{self, Write as _};
use std::path::Path;
use std::sync::Mutex;

use tracing::Level;
use tracing::field::{Field, Visit};
use tracing_subscriber::registry::LookupSpan;

use super::types::FileStatus;
use super::utils::{clock_time, log_file_path, start_time};
use crate::marble::Verb;

/// Fields the marble attaches to its events and spans.
#[derive(Debug, Default)]
struct MarbleFields {
    message: String,
    path: Option<String>,
    status: Option<String>,
}

impl Visit for MarbleFields {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record_str(field, &format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => value.clone_into(&mut self.message),
            "path" => self.path = Some(value.to_string()),
            "status" => self.status = Some(value.to_string()),
            _ => {}
        }
    }
}

/// Path of an enclosing span, stored in the span's extensions.
#[derive(Debug, Clone)]
struct SpanPath(String);

/// Path of the innermost path-carrying span around `event`, if any.
fn span_path<S>(
    event: &tracing::Event<'_>,
    ctx: &tracing_subscriber::layer::Context<'_, S>,
) -> Option<String>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    ctx.event_scope(event)?.find_map(|span| {
        let extensions = span.extensions();
        extensions.get::<SpanPath>().map(|p| p.0.clone())
    })
}

/// Render one log file line.
fn file_line(time: &str, level: Level, fields: &MarbleFields, path: Option<&str>) -> String {
    let msg = &fields.message;
    if let Some(status) = &fields.status {
        return format!("[{time}] {status:<9} {msg}");
    }
    let tag = match level {
        Level::ERROR => "[error] ",
        Level::WARN => "[warn] ",
        Level::DEBUG | Level::TRACE => "[debug] ",
        _ => "",
    };
    match fields.path.as_deref().or(path) {
        Some(path) => format!("[{time}] {tag}{path}: {msg}"),
        None => format!("[{time}] {tag}{msg}"),
    }
}

/// A [`tracing_subscriber::Layer`] that appends every event of a verb run to
/// its log file.
#[derive(Debug)]
pub(super) struct FileLayer {
    file: Mutex<fs::File>,
}

impl FileLayer {
    /// Create (truncating) the log file at `path` and write the run header
    /// naming `verb` and the `marble` it operates on.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be written.
    pub(super) fn create(path: &Path, verb: Verb, marble: &Path) -> io::Result<Self> {
        let version = option_env!("REALITYMARBLE_VERSION")
            .unwrap_or(concat!("dev-", env!("CARGO_PKG_VERSION")));
        let header = format!(
            "# realitymarble {version}\n\
             # verb:    {verb}\n\
             # marble:  {}\n\
             # started: {}\n",
            marble.display(),
            start_time(),
        );
        fs::write(path, header)?;
        let file = fs::OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl<S> tracing_subscriber::Layer<S> for FileLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut fields = MarbleFields::default();
        attrs.record(&mut fields);
        if let (Some(path), Some(span)) = (fields.path, ctx.span(id)) {
            span.extensions_mut().insert(SpanPath(path));
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut fields = MarbleFields::default();
        event.record(&mut fields);
        let path = span_path(event, &ctx);
        let line = file_line(&clock_time(), *event.metadata().level(), &fields, path.as_deref());

        if let Ok(mut f) = self.file.lock() {
            writeln!(f, "{line}").ok();
        }
    }
}

/// Console output: coloured level words, styled summary rows.
struct ConsoleFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let mut fields = MarbleFields::default();
        event.record(&mut fields);
        let msg = match &fields.path {
            Some(path) => format!("{path}: {}", fields.message),
            None => fields.message,
        };

        if let Some(status) = fields.status.as_deref().and_then(FileStatus::from_label) {
            let (icon, color) = status.style();
            return writeln!(writer, "{color}{icon} {msg}\x1b[0m");
        }
        match *event.metadata().level() {
            Level::ERROR => writeln!(writer, "\x1b[31merror:\x1b[0m {msg}"),
            Level::WARN => writeln!(writer, "\x1b[33mwarning:\x1b[0m {msg}"),
            Level::INFO => writeln!(writer, "{msg}"),
            _ => writeln!(writer, "\x1b[2m{msg}\x1b[0m"),
        }
    }
}

/// Initialise the global [`tracing`] subscriber for one `verb` run against
/// `marble`.
///
/// Warnings and errors go to stderr, everything else to stdout; debug
/// events reach the console only with `debug`. Every event at `DEBUG` and
/// above is also written to `$XDG_CACHE_HOME/realitymarble/<verb>.log`.
pub fn init_subscriber(debug: bool, verb: Verb, marble: &Path) {
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::{
        Layer as _, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let console_level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let make_writer = io::stderr
        .with_max_level(Level::WARN)
        .and(io::stdout.with_min_level(Level::INFO));

    let console_layer = fmt::layer()
        .event_format(ConsoleFormatter)
        .with_writer(make_writer)
        .with_filter(console_level);

    let file_layer = log_file_path(verb)
        .and_then(|path| FileLayer::create(&path, verb, marble).ok())
        .map(|layer| layer.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
}
