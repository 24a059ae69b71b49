//! # Service Runner
//!
//! [`ServiceBase`] owns the threads of a service and its run state. The
//! concrete service supplies the body each thread runs; the runner takes
//! care of spawning, stopping, joining and fault reporting.
//!
//! ## State
//! `started` counts running threads and `stop` is the stop request. Both
//! sit behind one `RwLock`: the hot path (`started()`, `stopping()`) only
//! reads. A fresh runner is `started = 0, stop = true`.
//!
//! ## Faults
//! A thread body returning an error, or panicking, is reported to the
//! service callback as a critical error. A panic is not swallowed: the
//! thread still dies with it and [`ServiceBase::wait`] re-raises it once
//! every thread is joined.

use std::any::Any;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};

use elements_api::errors::ServiceError;
use elements_api::message::{Error, Event};
use elements_api::types::{CallbackVar, ServiceResult};
use tracing::{debug, error};

use crate::{log_lifecycle, service_span};

/// Body run by every thread of a service.
pub type RunFn = Arc<dyn Fn() -> ServiceResult<()> + Send + Sync>;

#[derive(Debug)]
struct RunState {
    started: usize,
    stop: bool,
}

/// Generic N-thread start/stop/wait machinery.
pub struct ServiceBase {
    kind: &'static str,
    name: String,
    callback: CallbackVar,
    threads: usize,
    stack_size: Option<usize>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    state: Arc<RwLock<RunState>>,
}

impl ServiceBase {
    pub fn new(
        kind: &'static str,
        name: String,
        callback: CallbackVar,
        threads: usize,
        stack_size: Option<usize>,
    ) -> ServiceResult<Self> {
        if threads == 0 {
            return Err(ServiceError::InvalidArg(format!(
                "{} {:?}: threads number should be positive",
                kind, name
            )));
        }

        Ok(Self {
            kind,
            name,
            callback,
            threads,
            stack_size,
            handles: Mutex::new(Vec::new()),
            state: Arc::new(RwLock::new(RunState {
                started: 0,
                stop: true,
            })),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn callback(&self) -> &CallbackVar {
        &self.callback
    }

    /// Spawns the service threads, each running `run`.
    ///
    /// Returns `Ok(false)` if threads from a previous start are still
    /// running. If a thread cannot be spawned the ones already spawned exit
    /// without running `run` and are joined before the error is returned.
    pub fn start(&self, run: RunFn) -> ServiceResult<bool> {
        let mut state = write(&self.state);

        if state.started > 0 {
            return Ok(false);
        }

        let mut handles = lock(&self.handles);
        let first_new = handles.len();

        for index in 0..self.threads {
            let mut builder = thread::Builder::new().name(format!("{}-{}", self.name, index));

            if let Some(stack_size) = self.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let worker = Worker {
                kind: self.kind,
                name: self.name.clone(),
                index,
                callback: Arc::clone(&self.callback),
                state: Arc::clone(&self.state),
                run: Arc::clone(&run),
            };

            match builder.spawn(move || worker.run()) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    let spawned: Vec<_> = handles.drain(first_new..).collect();

                    // The spawned threads are blocked on the state lock; once
                    // released they see `started == 0` and return.
                    drop(handles);
                    drop(state);

                    for handle in spawned {
                        let _ = handle.join();
                    }

                    error!(service = %self.name, thread = index, "failed to spawn service thread: {}", err);

                    return Err(ServiceError::ThreadSpawn(format!(
                        "{}::start: failed to spawn thread {} of {:?}: {}",
                        self.kind, index, self.name, err
                    )));
                }
            }
        }

        state.started = self.threads;
        state.stop = false;

        log_lifecycle!(self.kind, self.name, "started", threads = self.threads);
        Ok(true)
    }

    /// Requests the threads to stop. `false` if not running or already
    /// stopping. Does not wait.
    pub fn stop(&self) -> bool {
        let mut state = write(&self.state);

        if state.started == 0 || state.stop {
            return false;
        }

        state.stop = true;

        log_lifecycle!(self.kind, self.name, "stopping");
        true
    }

    /// Joins every thread of the service. Returns at once when there is
    /// nothing to join.
    ///
    /// # Errors
    /// * `InvalidArg` when called from one of the service's own threads
    /// * `InconsistentState` when the running-thread count is not zero
    ///   after all threads are joined
    ///
    /// # Panics
    /// Re-raises the panic of a worker thread, after joining all of them.
    pub fn wait(&self) -> ServiceResult<()> {
        let handles = {
            let mut handles = lock(&self.handles);

            let current = thread::current().id();
            if handles.iter().any(|handle| handle.thread().id() == current) {
                return Err(ServiceError::InvalidArg(format!(
                    "{}::wait: {:?} can't be waited for from its own thread",
                    self.kind, self.name
                )));
            }

            mem::take(&mut *handles)
        };

        if handles.is_empty() {
            return Ok(());
        }

        let mut panic: Option<Box<dyn Any + Send>> = None;

        for handle in handles {
            if let Err(payload) = handle.join() {
                panic.get_or_insert(payload);
            }
        }

        if let Some(payload) = panic {
            panic::resume_unwind(payload);
        }

        let started = read(&self.state).started;
        if started != 0 {
            return Err(ServiceError::InconsistentState(format!(
                "{}::wait: {} thread(s) of {:?} still registered as running after join",
                self.kind, started, self.name
            )));
        }

        log_lifecycle!(self.kind, self.name, "joined");
        Ok(())
    }

    /// `true` while threads are running and no stop was requested.
    pub fn started(&self) -> bool {
        let state = read(&self.state);
        state.started > 0 && !state.stop
    }

    /// `true` once a stop was requested (and before the first start).
    pub fn stopping(&self) -> bool {
        read(&self.state).stop
    }

    /// `true` between a stop request and the exit of the last thread.
    pub fn draining(&self) -> bool {
        let state = read(&self.state);
        state.started > 0 && state.stop
    }
}

impl std::fmt::Debug for ServiceBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBase")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("threads", &self.threads)
            .field("state", &*read(&self.state))
            .finish()
    }
}

struct Worker {
    kind: &'static str,
    name: String,
    index: usize,
    callback: CallbackVar,
    state: Arc<RwLock<RunState>>,
    run: RunFn,
}

impl Worker {
    fn run(self) {
        if read(&self.state).started == 0 {
            return;
        }

        let _exit = ExitGuard {
            state: &self.state,
        };

        let span = service_span!(self.kind, self.name, worker = self.index);
        let _enter = span.enter();
        debug!("service thread running");

        match panic::catch_unwind(AssertUnwindSafe(|| (self.run)())) {
            Ok(Ok(())) => debug!("service thread finished"),
            Ok(Err(err)) => self.report(format!("{}::run: {}", self.kind, err)),
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                self.report(format!("{}::run: thread panicked: {}", self.kind, reason));
                panic::resume_unwind(payload);
            }
        }
    }

    fn report(&self, description: String) {
        error!("{}", description);
        let event = Event::from(Error::critical(description, self.name.as_str()));
        self.callback.notify(&event);
    }
}

/// Deregisters a thread on exit, unwinding included.
struct ExitGuard<'a> {
    state: &'a RwLock<RunState>,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        let mut state = write(self.state);
        state.started = state.started.saturating_sub(1);
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// Run-state locks are never held across user code, so poisoning can't leave
// the counters half-updated.
fn read(lock: &RwLock<RunState>) -> RwLockReadGuard<'_, RunState> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(lock: &RwLock<RunState>) -> RwLockWriteGuard<'_, RunState> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
