//! # Service Error Types
//!
//! Synchronous failures of the service layer. Anything reported through a
//! `Result` here is a programming error or a failed OS primitive; running out
//! of queue capacity or time is never an error and is reported as a plain
//! `false`/`None` by the operation itself.
//!
//! Faults discovered asynchronously by a running task travel the other
//! channel: [`Callback::notify`](crate::callback::Callback::notify) with an
//! [`Event::Error`](crate::message::Event::Error).
//!
//! ## Usage Example
//!
//! ```rust
//! use elements_api::errors::ServiceError;
//!
//! fn check_threads(threads: usize) -> Result<(), ServiceError> {
//!     if threads == 0 {
//!         return Err(ServiceError::InvalidArg(
//!             "threads number should be positive".to_string(),
//!         ));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_threads(0).is_err());
//! ```

use thiserror::Error;

/// Core error type for service operations.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// A caller passed an argument the operation cannot accept.
    ///
    /// Raised synchronously and never retried: zero worker threads, a zero
    /// capacity task queue, waiting for a service from one of its own
    /// threads and similar misuse.
    #[error("Invalid argument: {0}")]
    InvalidArg(String),

    /// The operating system refused to create a worker thread.
    #[error("Failed to spawn service thread: {0}")]
    ThreadSpawn(String),

    /// Internal bookkeeping no longer adds up.
    ///
    /// Seeing this means a bug in the service itself, for example a
    /// running-thread counter that did not return to zero after every
    /// thread was joined.
    #[error("Inconsistent service state: {0}")]
    InconsistentState(String),

    /// Waiting on a queue condition failed for a reason other than timeout.
    #[error("Queue failure: {0}")]
    Queue(String),

    /// Catch-all for errors raised by service implementations.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ServiceError {
    /// Check if this is an invalid argument error.
    pub fn is_invalid_arg(&self) -> bool {
        matches!(self, ServiceError::InvalidArg(_))
    }
}
