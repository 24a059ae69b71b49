//! # Service Events
//!
//! Out-of-band occurrences reported by services to a
//! [`Callback`](crate::callback::Callback).
//!
//! The set of event kinds the service core itself understands is closed:
//! an operational [`Error`] with a severity, and the pool-internal
//! `Shutdown` signal. Everything else a consumer wants to route through the
//! same channel travels as a [`Message`] carrying an opaque [`Payload`] that
//! the receiving callback downcasts.
//!
//! ## Usage Example
//!
//! ```rust
//! use elements_api::message::{Error, Event, Message, Severity};
//!
//! #[derive(Debug)]
//! struct Reload;
//!
//! let event = Event::Message(Message::new("config-watcher", Reload));
//!
//! match &event {
//!     Event::Error(error) => eprintln!("{}", error),
//!     Event::Shutdown { source } => eprintln!("{} asked to shut down", source),
//!     Event::Message(msg) => assert!(msg.payload().is::<Reload>()),
//! }
//!
//! let error = Event::Error(Error::new("disk full", "writer", Severity::Alert));
//! assert!(error.is_error());
//! ```

use std::fmt;
use std::sync::Arc;

use downcast_rs::{impl_downcast, DowncastSync};
use tracing::Level;

/// Upper bound for an error description, in bytes.
pub const MAX_DESCRIPTION_LEN: usize = 10 * 1024 - 1;

/// Source name used when an event has no identifiable origin.
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// How serious an operational fault is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Severity {
    #[default]
    Critical,
    Alert,
    Warning,
    Notice,
}

impl Severity {
    /// Logging level an error of this severity is written with.
    pub fn level(self) -> Level {
        match self {
            Severity::Critical | Severity::Alert => Level::ERROR,
            Severity::Warning => Level::WARN,
            Severity::Notice => Level::INFO,
        }
    }

    /// Human readable label used when rendering an error.
    pub fn label(self) -> &'static str {
        match self {
            Severity::Critical => "critical error",
            Severity::Alert => "alert",
            Severity::Warning => "warning",
            Severity::Notice => "notice",
        }
    }
}

/// An operational fault reported by a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    source: String,
    severity: Severity,
    description: String,
}

impl Error {
    /// Creates an error, truncating the description to
    /// [`MAX_DESCRIPTION_LEN`] bytes on a character boundary.
    pub fn new(description: impl Into<String>, source: impl Into<String>, severity: Severity) -> Self {
        let mut description = description.into();

        if description.len() > MAX_DESCRIPTION_LEN {
            let mut end = MAX_DESCRIPTION_LEN;
            while !description.is_char_boundary(end) {
                end -= 1;
            }
            description.truncate(end);
        }

        Self {
            source: source_or_unknown(source.into()),
            severity,
            description,
        }
    }

    /// Creates a [`Severity::Critical`] error.
    pub fn critical(description: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(description, source, Severity::Critical)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} received from {}. Description:\n{}",
            self.severity.label(),
            self.source,
            self.description
        )
    }
}

/// Consumer-defined event content.
///
/// Implemented for every `Debug + Send + Sync + 'static` type; callbacks
/// recover the concrete type with `downcast_ref`.
pub trait Payload: DowncastSync + fmt::Debug {}
impl_downcast!(sync Payload);

impl<T> Payload for T where T: fmt::Debug + Send + Sync + 'static {}

/// A consumer-defined event together with its origin.
#[derive(Debug, Clone)]
pub struct Message {
    source: String,
    payload: Arc<dyn Payload>,
}

impl Message {
    pub fn new<P: Payload>(source: impl Into<String>, payload: P) -> Self {
        Self::from_arc(source, Arc::new(payload))
    }

    /// Wraps a payload that is already shared.
    pub fn from_arc(source: impl Into<String>, payload: Arc<dyn Payload>) -> Self {
        Self {
            source: source_or_unknown(source.into()),
            payload,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn payload(&self) -> &dyn Payload {
        self.payload.as_ref()
    }

    /// Shorthand for `payload().downcast_ref::<P>()`.
    pub fn downcast_ref<P: Payload>(&self) -> Option<&P> {
        self.payload.downcast_ref::<P>()
    }
}

/// Everything that can be passed to a callback.
#[derive(Debug, Clone)]
pub enum Event {
    /// An operational fault with a severity.
    Error(Error),
    /// The request for the receiver to shut down, typically delivered by an
    /// execution-required pool task so it survives a draining pool.
    Shutdown { source: String },
    /// Any other event. The core never interprets these.
    Message(Message),
}

impl Event {
    pub fn shutdown(source: impl Into<String>) -> Self {
        Event::Shutdown {
            source: source_or_unknown(source.into()),
        }
    }

    /// Name of the service the event originates from.
    pub fn source(&self) -> &str {
        match self {
            Event::Error(error) => error.source(),
            Event::Shutdown { source } => source,
            Event::Message(msg) => msg.source(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Event::Error(_))
    }

    pub fn as_error(&self) -> Option<&Error> {
        match self {
            Event::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Renders the event for a log sink.
    ///
    /// Errors are written with the level of their severity. Any other event
    /// reaching a log sink was not handled by anyone and is rendered as
    /// "unknown" with the highest level.
    pub fn error_message(&self, prefix: Option<&str>) -> (String, Level) {
        let prefix = prefix.unwrap_or("");

        match self {
            Event::Error(error) => (format!("{}{}", prefix, error), error.severity().level()),
            other => (format!("{}unknown {}", prefix, other), Level::ERROR),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Error(error) => fmt::Display::fmt(error, f),
            Event::Shutdown { source } => write!(f, "shutdown event received from {}", source),
            Event::Message(msg) => write!(f, "event received from {}", msg.source()),
        }
    }
}

impl From<Error> for Event {
    fn from(error: Error) -> Self {
        Event::Error(error)
    }
}

impl From<Message> for Event {
    fn from(msg: Message) -> Self {
        Event::Message(msg)
    }
}

fn source_or_unknown(source: String) -> String {
    if source.is_empty() {
        UNKNOWN_SOURCE.to_string()
    } else {
        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_is_truncated_on_char_boundary() {
        // 3-byte characters never line up with the limit exactly
        let long = "\u{20ac}".repeat(MAX_DESCRIPTION_LEN);
        let error = Error::critical(long, "svc");

        assert!(error.description().len() <= MAX_DESCRIPTION_LEN);
        assert!(error.description().len() > MAX_DESCRIPTION_LEN - 3);
        assert!(error.description().chars().all(|c| c == '\u{20ac}'));
    }

    #[test]
    fn test_empty_source_becomes_unknown() {
        let error = Error::critical("boom", "");
        assert_eq!(error.source(), UNKNOWN_SOURCE);
        assert_eq!(Event::shutdown("").source(), UNKNOWN_SOURCE);
    }
}
