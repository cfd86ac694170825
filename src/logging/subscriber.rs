//! Tracing subscriber: console formatter, run log file layer, initialisation.
use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use tracing::{Event, Level};

use super::utils::{log_file_path, strip_ansi};

/// Event target for stage headers.
pub(super) const STAGE_TARGET: &str = "dotsync::stage";
/// Event target for dry-run previews.
pub(super) const DRY_RUN_TARGET: &str = "dotsync::dry_run";

/// How an event is rendered, on the console and in the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Stage,
    DryRun,
    Error,
    Warn,
    Info,
    Debug,
}

impl LineKind {
    fn of(event: &Event<'_>) -> Self {
        let metadata = event.metadata();
        match (*metadata.level(), metadata.target()) {
            (Level::ERROR, _) => Self::Error,
            (Level::WARN, _) => Self::Warn,
            (Level::INFO, STAGE_TARGET) => Self::Stage,
            (Level::INFO, DRY_RUN_TARGET) => Self::DryRun,
            (Level::INFO, _) => Self::Info,
            _ => Self::Debug,
        }
    }

    /// Plain-text prefix used in the log file.
    const fn file_prefix(self) -> &'static str {
        match self {
            Self::Stage => "==> ",
            Self::DryRun => "    [dry run] ",
            Self::Error => "    [error] ",
            Self::Warn => "    [warn] ",
            Self::Info => "    ",
            Self::Debug => "    [debug] ",
        }
    }
}

/// The `message` field of an event.
fn message_of(event: &Event<'_>) -> String {
    #[derive(Default)]
    struct Message(String);

    impl tracing::field::Visit for Message {
        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            if field.name() == "message" {
                value.clone_into(&mut self.0);
            }
        }

        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    let mut visitor = Message::default();
    event.record(&mut visitor);
    visitor.0
}

/// Appends every event to the run log, timestamped and without colour codes.
#[derive(Debug)]
pub(super) struct FileLayer {
    file: Mutex<fs::File>,
}

impl FileLayer {
    /// Truncate `path`, write a run header, and return a layer appending to it.
    ///
    /// Returns `None` if the file cannot be written.
    pub(super) fn create(path: &Path) -> Option<Self> {
        let version =
            option_env!("DOTSYNC_VERSION").unwrap_or(concat!("dev-", env!("CARGO_PKG_VERSION")));
        let rule = "-".repeat(48);
        let header = format!(
            "{rule}\ndotsync {version} {}\n{rule}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        );
        fs::write(path, header).ok()?;
        let file = fs::OpenOptions::new().append(true).open(path).ok()?;
        Some(Self {
            file: Mutex::new(file),
        })
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for FileLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let line = format!(
            "[{}] {}{}",
            Utc::now().format("%H:%M:%S"),
            LineKind::of(event).file_prefix(),
            strip_ansi(&message_of(event))
        );
        if let Ok(mut file) = self.file.lock() {
            writeln!(file, "{line}").ok();
        }
    }
}

/// Console output: coloured level tags and stage headers.
struct DotsyncFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for DotsyncFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let msg = message_of(event);
        match LineKind::of(event) {
            LineKind::Stage => writeln!(writer, "\x1b[1;36m==>\x1b[0m \x1b[1m{msg}\x1b[0m"),
            LineKind::DryRun => writeln!(writer, "  \x1b[35m[dry run]\x1b[0m {msg}"),
            LineKind::Error => writeln!(writer, "\x1b[31merror:\x1b[0m {msg}"),
            LineKind::Warn => writeln!(writer, "\x1b[33mwarning:\x1b[0m {msg}"),
            LineKind::Info => writeln!(writer, "  {msg}"),
            LineKind::Debug => writeln!(writer, "  \x1b[2m{msg}\x1b[0m"),
        }
    }
}

/// Install the global [`tracing`] subscriber.
///
/// The console shows `info` and above, `debug` too when `verbose`; warnings
/// and errors go to stderr. The file layer records every event in
/// `$XDG_CACHE_HOME/dotsync/<command>.log`. Call once, before any logging.
pub fn init_subscriber(verbose: bool, command: &str) {
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::{
        Layer as _, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let console_filter = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let writer = std::io::stderr
        .with_max_level(Level::WARN)
        .and(std::io::stdout.with_min_level(Level::INFO));
    let console = fmt::layer()
        .event_format(DotsyncFormatter)
        .with_writer(writer)
        .with_filter(console_filter);

    let run_log = log_file_path(command)
        .and_then(|path| FileLayer::create(&path))
        .map(|layer| layer.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(console)
        .with(run_log)
        .init();
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn header_names_tool_and_version() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sync.log");
        assert!(FileLayer::create(&path).is_some());
        let header = fs::read_to_string(&path).unwrap();
        assert_eq!(header.lines().count(), 3);
        assert!(header.lines().nth(1).unwrap().starts_with("dotsync "));
    }

    #[test]
    fn unwritable_path_yields_no_layer() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(FileLayer::create(&tmp.path().join("missing").join("sync.log")).is_none());
    }

    #[test]
    fn prefixes_are_distinct() {
        let kinds = [
            LineKind::Stage,
            LineKind::DryRun,
            LineKind::Error,
            LineKind::Warn,
            LineKind::Info,
            LineKind::Debug,
        ];
        let prefixes: std::collections::HashSet<_> =
            kinds.iter().map(|k| k.file_prefix()).collect();
        assert_eq!(prefixes.len(), kinds.len());
    }
}
