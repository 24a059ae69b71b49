//! # Services
//!
//! Thread-backed implementations of the [`Service`](elements_api::service::Service)
//! lifecycle:
//!
//! - [`thread_pool`]: worker threads consuming tasks from a bounded queue
//! - [`timer`]: one thread firing events at their deadlines
//! - [`compound`]: a pool and a timer run as one service
//! - [`base`]: the thread runner the others are built on

pub mod base;
pub mod compound;
pub mod thread_pool;
pub mod timer;

pub use base::ServiceBase;
pub use compound::CompoundService;
pub use thread_pool::{ServiceEvent, Task, TaskBase, TaskVar, ThreadPool};
pub use timer::{Timer, TimerEvent, TimerEventVar};
