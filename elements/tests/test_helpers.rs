#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use elements_api::callback::FnCallback;
use elements_api::message::Event;
use elements_api::types::CallbackVar;

/// Events received by a [`recording_callback`].
pub type Recorded = Arc<Mutex<Vec<Event>>>;

/// A callback that stores every event it is notified of and reports it
/// handled.
pub fn recording_callback() -> (CallbackVar, Recorded) {
    let events: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);

    let callback: CallbackVar = Arc::new(FnCallback::new(move |event: &Event| {
        sink.lock().unwrap().push(event.clone());
        true
    }));

    (callback, events)
}

/// Polls `condition` until it holds or `timeout` passes; returns the last
/// result.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }

    condition()
}

/// Sleeps for `duration_millis`, used to let spawned threads reach a
/// blocking call.
pub fn wait_for(duration_millis: u64) {
    thread::sleep(Duration::from_millis(duration_millis));
}

/// Default upper bound for anything a test waits on.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default wait time for letting threads settle, in milliseconds
pub const DEFAULT_WAIT_TIME: u64 = 100;
