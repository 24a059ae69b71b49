use std::sync::Arc;

use crate::callback::Callback;
use crate::errors::ServiceError;

// Type aliases for common types
pub type ServiceResult<T> = Result<T, ServiceError>;
pub type CallbackVar = Arc<dyn Callback>;
