//! # Elements Service API
//!
//! The abstract protocol of the Elements service core: a lifecycle interface
//! for services and an observer channel through which running services
//! report faults and notifications out of band.
//!
//! ## Design Principles
//!
//! - **Explicit lifecycle**: services are started, stopped and waited for
//!   explicitly; stopping is a request, waiting is the join.
//! - **Out-of-band faults**: work running on a service thread has no caller
//!   to return an error to. It reports through a [`Callback`] instead, and
//!   the callback implementer decides how far the fault propagates.
//! - **Closed event set**: the kinds of events the core itself understands
//!   are a fixed enum; consumer-defined events ride along as opaque
//!   payloads.
//!
//! ## Core Components
//!
//! - [`Service`]: start / stop / wait / started
//! - [`Event`], [`Error`], [`Severity`], [`Message`]: what gets reported
//! - [`Callback`]: who it gets reported to
//! - [`ServiceError`]: synchronous failures of service operations
//!
//! ## Module Organization
//!
//! - [`service`]: the lifecycle trait
//! - [`message`]: events, errors and payloads
//! - [`callback`]: the observer trait and stock implementations
//! - [`errors`]: error types
//! - [`types`]: common type aliases

pub mod callback;
pub mod errors;
pub mod message;
pub mod service;
pub mod types;

pub use callback::{Callback, FnCallback, LoggingCallback};
pub use errors::ServiceError;
pub use message::{Error, Event, Message, Payload, Severity, MAX_DESCRIPTION_LEN};
pub use service::Service;
pub use types::{CallbackVar, ServiceResult};
