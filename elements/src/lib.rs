// Elements service core
//
// Thread-backed implementation of the Elements service API: intrusive
// reference counting, a bounded blocking queue, and the thread pool, timer
// and compound services built on them.

pub mod config;
pub mod error;
pub mod logging;
pub mod queue;
pub mod refcount;
pub mod service;

// Macros expand to `$crate::tracing::...` so callers need no direct dependency.
#[doc(hidden)]
pub use tracing;

pub use config::{CompoundServiceConfig, ThreadPoolConfig, TimerConfig};
pub use error::{QueueError, RefCountError};
pub use queue::{EnqueueStrategy, Queue};
pub use service::{
    CompoundService, ServiceEvent, Task, TaskBase, TaskVar, ThreadPool, Timer, TimerEvent,
    TimerEventVar,
};

pub use elements_api::{
    Callback, CallbackVar, Error, Event, FnCallback, LoggingCallback, Message, Payload, Service,
    ServiceError, ServiceResult, Severity,
};
