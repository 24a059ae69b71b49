// Logging for the Elements service core
//
// Services run their work on threads nobody is waiting on, so the log is
// where lifecycle transitions and asynchronous faults become visible. Every
// statement goes through the `tracing` ecosystem; this module installs the
// global subscriber and provides the span/event macros the services use.
//
// # Usage Examples
//
// ## Initialization
//
// ```rust
// use elements::logging;
//
// // INFO level, human-readable console output
// logging::init_default();
//
// // Or a custom configuration
// let config = logging::LogConfig {
//     level: tracing::Level::DEBUG,
//     json_format: false,
//     ..Default::default()
// };
// logging::init(config);
// ```
//
// Only the first initialization in a process takes effect.
//
// ## Spans and lifecycle events
//
// ```rust
// use elements::{log_lifecycle, service_span};
//
// let span = service_span!("ThreadPool", "orders");
// let _guard = span.enter();
// log_lifecycle!("ThreadPool", "orders", "started", threads = 4);
// ```
//
// ## Events
//
// Events reported through a `Callback` can be written out with the level
// their severity maps to:
//
// ```rust
// use elements::logging;
// use elements_api::message::{Error, Event, Severity};
//
// let event = Event::from(Error::new("disk almost full", "storage", Severity::Warning));
// logging::log_event(&event, Some("storage monitor: "));
// ```

use std::fs::{File, OpenOptions};
use std::io;
use std::sync::{Mutex, Once};

use elements_api::message::Event;
use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, layer::Layered, prelude::*, registry::Registry, EnvFilter, Layer};

/// Configuration for the logging system.
///
/// # Examples
///
/// ```rust
/// use elements::logging::LogConfig;
/// use tracing::Level;
///
/// let config = LogConfig {
///     level: Level::DEBUG,
///     json_format: true,
///     show_file_line: false,
///     show_thread_info: true,
///     show_time: true,
///     target_filters: Some("elements=debug,elements::queue=trace".to_string()),
/// };
/// assert!(config.json_format);
/// ```
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id; worker threads are named after
    /// their service, so this is usually worth keeping on
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

static INIT: Once = Once::new();

type Filtered = Layered<EnvFilter, Registry>;

fn env_filter(config: &LogConfig) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env().add_directive(config.level.into());

    if let Some(filters) = &config.target_filters {
        for directive in filters.split(',') {
            match directive.trim().parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(err) => eprintln!("Ignoring log filter directive {:?}: {}", directive, err),
            }
        }
    }

    filter
}

fn console_layer(config: &LogConfig) -> Box<dyn Layer<Filtered> + Send + Sync> {
    if config.json_format {
        return fmt::layer()
            .json()
            .flatten_event(true)
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line)
            .with_thread_names(config.show_thread_info)
            .with_thread_ids(config.show_thread_info)
            .boxed();
    }

    let layer = fmt::layer()
        .with_ansi(atty::is(atty::Stream::Stdout))
        .with_file(config.show_file_line)
        .with_line_number(config.show_file_line)
        .with_thread_names(config.show_thread_info)
        .with_thread_ids(config.show_thread_info);

    if config.show_time {
        layer.boxed()
    } else {
        layer.without_time().boxed()
    }
}

/// Initialize the logging system with the given configuration.
///
/// Safe to call multiple times; only the first call takes effect.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::registry()
            .with(env_filter(&config))
            .with(console_layer(&config));

        set_global_subscriber(subscriber);
    });
}

fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Opens `path` for appending, creating it if needed.
pub fn file_writer(path: &str) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Initialize logging to both the console and `log_file`.
///
/// The file is opened once, up front, so an unwritable path is reported
/// here; every thread then writes through the same handle. File output
/// never carries ANSI colors and always includes location and thread
/// information.
///
/// As with [`init`], only the first initialization in a process installs a
/// subscriber; later calls still check that the file can be opened.
///
/// # Errors
/// Returns the I/O error if the file cannot be opened or created.
pub fn init_with_file(config: LogConfig, log_file: &str) -> io::Result<()> {
    let file = file_writer(log_file)?;

    INIT.call_once(move || {
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_thread_ids(true);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter(&config))
            .with(console_layer(&config))
            .with(file_layer);

        set_global_subscriber(subscriber);
    });

    Ok(())
}

/// INFO level, human-readable console output.
pub fn init_default() {
    init(LogConfig::default());
}

/// Initialize logging for tests: warnings and errors only, compact output.
///
/// ```rust
/// #[test]
/// fn pool_drains_on_stop() {
///     elements::logging::init_test();
///     // ...
/// }
/// ```
pub fn init_test() {
    let config = LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    };
    init(config);
}

/// Writes `event` to the log at the level its severity maps to.
///
/// Critical errors and alerts are logged as `ERROR`, warnings as `WARN`,
/// notices as `INFO`. Events that are not errors are logged as `ERROR`
/// with an "unknown" marker: a service should never have to log them.
pub fn log_event(event: &Event, prefix: Option<&str>) {
    let (message, level) = event.error_message(prefix);
    let source = event.source();

    if !event.is_error() {
        tracing::error!(source, emergency = true, "{}", message);
    } else if level == Level::ERROR {
        tracing::error!(source, "{}", message);
    } else if level == Level::WARN {
        tracing::warn!(source, "{}", message);
    } else {
        tracing::info!(source, "{}", message);
    }
}

/// Create a span covering the lifetime of a service thread.
///
/// ```rust
/// use elements::service_span;
///
/// let span = service_span!("Timer", "reminders");
/// let _guard = span.enter();
///
/// let span = service_span!("ThreadPool", "orders", worker = 3);
/// ```
#[macro_export]
macro_rules! service_span {
    ($kind:expr, $name:expr) => {
        $crate::tracing::info_span!("service", kind = $kind, name = %$name)
    };
    ($kind:expr, $name:expr, $($fields:tt)*) => {
        $crate::tracing::info_span!("service", kind = $kind, name = %$name, $($fields)*)
    };
}

/// Create a span around the execution of a single task.
///
/// ```rust
/// use elements::task_span;
///
/// let span = task_span!("orders", required = true);
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! task_span {
    ($service:expr) => {
        $crate::tracing::debug_span!("task", service = %$service)
    };
    ($service:expr, $($fields:tt)*) => {
        $crate::tracing::debug_span!("task", service = %$service, $($fields)*)
    };
}

/// Log a service lifecycle transition (started, stopping, joined, ...).
///
/// ```rust
/// use elements::log_lifecycle;
///
/// log_lifecycle!("ThreadPool", "orders", "started");
/// log_lifecycle!("ThreadPool", "orders", "stopping", queued = 12);
/// ```
#[macro_export]
macro_rules! log_lifecycle {
    ($kind:expr, $name:expr, $event:expr) => {
        $crate::tracing::info!(service_kind = $kind, service = %$name, event = $event)
    };
    ($kind:expr, $name:expr, $event:expr, $($fields:tt)*) => {
        $crate::tracing::info!(service_kind = $kind, service = %$name, event = $event, $($fields)*)
    };
}

/// Log an error value with optional context fields.
///
/// ```rust
/// use elements::log_error;
///
/// let error = std::io::Error::new(std::io::ErrorKind::NotFound, "config missing");
/// log_error!(error);
/// log_error!(error, service = "orders", operation = "start");
/// ```
#[macro_export]
macro_rules! log_error {
    ($error:expr) => {
        $crate::tracing::error!(error = %$error)
    };
    ($error:expr, $($fields:tt)*) => {
        $crate::tracing::error!(error = %$error, $($fields)*)
    };
}

pub use tracing::{debug, error, info, trace, warn};
