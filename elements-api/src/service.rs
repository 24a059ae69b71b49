//! # Service Lifecycle
//!
//! A service is a component with an explicit `start` / `stop` / `wait`
//! lifecycle, typically owning one or more OS threads.
//!
//! ## State Machine
//!
//! ```text
//!  Stopped --start()--> Running --stop()--> Stopping --wait()--> Stopped
//! ```
//!
//! - `start` and `stop` are idempotent and report whether they changed
//!   anything.
//! - `stop` only requests the transition. It may be called from any thread,
//!   including from inside a task the service is running.
//! - `wait` blocks until every thread of the service has finished. Calling
//!   it after `stop` never deadlocks against tasks still in flight; they
//!   are allowed to finish first.

use crate::types::ServiceResult;

/// Lifecycle interface shared by every service.
pub trait Service: Send + Sync {
    /// Name used to identify the service in events and logs.
    fn name(&self) -> &str;

    /// Starts the service.
    ///
    /// # Returns
    /// * `Ok(true)` - the service was started by this call
    /// * `Ok(false)` - the service was already started
    fn start(&self) -> ServiceResult<bool>;

    /// Requests the service to stop.
    ///
    /// # Returns
    /// * `Ok(true)` - the stop was requested by this call
    /// * `Ok(false)` - the service was not running or is already stopping
    fn stop(&self) -> ServiceResult<bool>;

    /// Blocks until the service has completely stopped.
    fn wait(&self) -> ServiceResult<()>;

    /// Point-in-time check whether the service is running and not stopping.
    fn started(&self) -> bool;
}
