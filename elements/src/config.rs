use uuid::Uuid;

use elements_api::errors::ServiceError;
use elements_api::types::ServiceResult;

use crate::queue::EnqueueStrategy;

/// Capacity used when no queue size is configured.
pub const UNBOUNDED_QUEUE_SIZE: usize = usize::MAX;

/// Returns `name`, or a generated `"<kind>-<uuid>"` when it is empty, so
/// every service can be told apart in logs and thread names.
pub fn service_name(kind: &str, name: &str) -> String {
    if name.is_empty() {
        format!("{}-{}", kind, Uuid::new_v4())
    } else {
        name.to_string()
    }
}

// --- Thread pool ---

/// Configuration for a `ThreadPool`.
#[derive(Clone, Debug)]
pub struct ThreadPoolConfig {
    /// Service name; worker threads are named `<name>-<index>`.
    pub name: String,

    /// Number of worker threads. Must be positive.
    pub threads: usize,

    /// Stack size of each worker, `None` for the platform default.
    pub stack_size: Option<usize>,

    /// Capacity of the task queue. Must be positive.
    pub queue_size: usize,

    /// Strategy used when `execute` is called with `EnqueueStrategy::Default`.
    pub enqueue_strategy: EnqueueStrategy,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            threads: 1,
            stack_size: None,
            queue_size: UNBOUNDED_QUEUE_SIZE,
            enqueue_strategy: EnqueueStrategy::Back,
        }
    }
}

impl ThreadPoolConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// One worker per logical CPU.
    pub fn per_cpu(name: impl Into<String>) -> Self {
        Self::new(name).with_threads(num_cpus::get())
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn with_enqueue_strategy(mut self, strategy: EnqueueStrategy) -> Self {
        self.enqueue_strategy = strategy;
        self
    }

    pub fn validate(&self) -> ServiceResult<()> {
        if self.threads == 0 {
            return Err(ServiceError::InvalidArg(format!(
                "ThreadPool {:?}: threads number should be positive",
                self.name
            )));
        }

        if self.queue_size == 0 {
            return Err(ServiceError::InvalidArg(format!(
                "ThreadPool {:?}: queue size should be positive",
                self.name
            )));
        }

        Ok(())
    }

    /// The strategy an `execute` call actually uses.
    pub fn resolve_strategy(&self, requested: EnqueueStrategy) -> EnqueueStrategy {
        match requested {
            EnqueueStrategy::Default => self.enqueue_strategy,
            other => other,
        }
    }
}

// --- Timer ---

/// Configuration for a `Timer`.
#[derive(Clone, Debug, Default)]
pub struct TimerConfig {
    pub name: String,
    pub stack_size: Option<usize>,
}

impl TimerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stack_size: None,
        }
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }
}

// --- Compound service ---

/// Configuration for a `CompoundService` and the two services it owns.
#[derive(Clone, Debug)]
pub struct CompoundServiceConfig {
    pub name: String,
    pub pool: ThreadPoolConfig,
    pub timer: TimerConfig,
}

impl CompoundServiceConfig {
    /// Names the owned services `<name>_thread_pool` and `<name>_timer`.
    ///
    /// An empty `name` is generated first so the derived names share it.
    pub fn new(name: impl Into<String>) -> Self {
        let name = service_name("CompoundService", &name.into());

        Self {
            pool: ThreadPoolConfig::new(format!("{}_thread_pool", name)),
            timer: TimerConfig::new(format!("{}_timer", name)),
            name,
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.pool.threads = threads;
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.pool.stack_size = Some(stack_size);
        self.timer.stack_size = Some(stack_size);
        self
    }

    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.pool.queue_size = queue_size;
        self
    }

    pub fn with_enqueue_strategy(mut self, strategy: EnqueueStrategy) -> Self {
        self.pool.enqueue_strategy = strategy;
        self
    }
}

impl Default for CompoundServiceConfig {
    fn default() -> Self {
        Self::new("")
    }
}
