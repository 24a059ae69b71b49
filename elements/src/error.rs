use thiserror::Error;

use elements_api::errors::ServiceError;

/// Errors related to bounded queue operations.
///
/// A full, empty, closed or awakened queue is not an error; those outcomes
/// are the `false`/`None` results of `enqueue`/`dequeue`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue::{operation}: waiting for the queue condition failed: {reason}")]
    WaitFailed { operation: &'static str, reason: String },
}

/// Errors related to reference-counted smart pointers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefCountError {
    #[error("Smart pointer is not initialized")]
    NotInitialized,
}

impl From<QueueError> for ServiceError {
    fn from(err: QueueError) -> Self {
        ServiceError::Queue(err.to_string())
    }
}
