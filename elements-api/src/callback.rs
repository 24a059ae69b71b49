//! # Event Callbacks
//!
//! [`Callback`] is the single fan-in point for asynchronous occurrences. A
//! callback is invoked synchronously on whichever thread produced the event,
//! usually a pool worker, so it must not block indefinitely or it stalls
//! that worker.
//!
//! ## Usage Example
//!
//! ```rust
//! use std::sync::Arc;
//! use elements_api::callback::{Callback, FnCallback};
//! use elements_api::message::Event;
//!
//! let callback: Arc<dyn Callback> = Arc::new(FnCallback::new(|event: &Event| {
//!     match event {
//!         Event::Error(error) => {
//!             eprintln!("{}", error);
//!             true
//!         }
//!         _ => false,
//!     }
//! }));
//!
//! assert!(!callback.notify(&Event::shutdown("pool")));
//! ```

use std::fmt;

use crate::message::Event;

/// Receiver of out-of-band service events.
pub trait Callback: Send + Sync {
    /// Handles an event.
    ///
    /// Implementors return `true` when they consider the event fully
    /// processed and no further propagation is needed. Unrecognized events
    /// should be logged and answered with `false`, never turned into a panic.
    fn notify(&self, event: &Event) -> bool;
}

/// Adapts a closure into a [`Callback`].
pub struct FnCallback<F>(F);

impl<F> FnCallback<F>
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Callback for FnCallback<F>
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    fn notify(&self, event: &Event) -> bool {
        (self.0)(event)
    }
}

impl<F> fmt::Debug for FnCallback<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnCallback")
    }
}

/// Callback that writes every event to the log and handles none of them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCallback;

impl Callback for LoggingCallback {
    fn notify(&self, event: &Event) -> bool {
        let (msg, level) = event.error_message(None);

        if level == tracing::Level::ERROR {
            tracing::error!(source = event.source(), "{}", msg);
        } else if level == tracing::Level::WARN {
            tracing::warn!(source = event.source(), "{}", msg);
        } else {
            tracing::info!(source = event.source(), "{}", msg);
        }

        false
    }
}
