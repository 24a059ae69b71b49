// Integration tests for the compound (thread pool + timer) service

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use elements::config::CompoundServiceConfig;
use elements::queue::EnqueueStrategy;
use elements::service::compound::CompoundService;
use elements::service::thread_pool::{ServiceEvent, TaskBase, TaskVar};
use elements_api::message::{Error, Event, Severity};
use elements_api::service::Service;

mod test_helpers;
use test_helpers::{recording_callback, wait_until, Recorded, DEFAULT_TIMEOUT};

fn service(name: &str) -> (CompoundService, Recorded) {
    let (callback, events) = recording_callback();
    let config = CompoundServiceConfig::new(name).with_threads(2);
    (CompoundService::new(callback, config).unwrap(), events)
}

fn counting(counter: &Arc<AtomicUsize>) -> TaskVar {
    let counter = Arc::clone(counter);
    Arc::new(TaskBase::required(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }))
}

#[test]
fn test_owned_services_are_named_after_the_compound() {
    let (service, _) = service("mailer");

    assert_eq!(service.name(), "mailer");
    assert_eq!(service.thread_pool().name(), "mailer_thread_pool");
    assert_eq!(service.timer().name(), "mailer_timer");
}

#[test]
fn test_deliver_now_and_immediate_delivery() {
    let (service, _) = service("now");
    let counter = Arc::new(AtomicUsize::new(0));

    assert!(service.start().unwrap());
    assert!(service.started());

    assert!(service.deliver_now(counting(&counter), None, EnqueueStrategy::Default).unwrap());
    assert!(service.deliver_at_time(counting(&counter), None).unwrap());

    assert!(wait_until(DEFAULT_TIMEOUT, || counter.load(Ordering::SeqCst) == 2));
    service.stop().unwrap();
    service.wait().unwrap();
    assert!(!service.started());
}

#[test]
fn test_delayed_delivery_runs_after_deadline() {
    let (service, _) = service("delayed");
    let ran_at = Arc::new(Mutex::new(None));

    service.start().unwrap();

    let at = Instant::now() + Duration::from_millis(60);
    let slot = Arc::clone(&ran_at);
    let task = TaskBase::required(move || {
        *slot.lock().unwrap() = Some(Instant::now());
    });
    assert!(service.deliver_at_time(Arc::new(task), Some(at)).unwrap());
    assert_eq!(service.pending_deliveries(), 1);

    assert!(wait_until(DEFAULT_TIMEOUT, || ran_at.lock().unwrap().is_some()));
    assert!(ran_at.lock().unwrap().unwrap() >= at);
    assert_eq!(service.pending_deliveries(), 0);

    service.stop().unwrap();
    service.wait().unwrap();
}

#[test]
fn test_wait_discards_undelivered_tasks() {
    let (service, _) = service("discard");
    let counter = Arc::new(AtomicUsize::new(0));

    service.start().unwrap();
    let far = Instant::now() + Duration::from_secs(3600);
    service.deliver_at_time(counting(&counter), Some(far)).unwrap();

    assert!(service.stop().unwrap());
    service.wait().unwrap();

    assert_eq!(service.pending_deliveries(), 0);
    assert_eq!(service.task_queue_size(), 0);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn test_errors_are_forwarded_under_the_compound_name() {
    let (service, events) = service("forwarder");
    service.start().unwrap();

    // Reported through the callback the owned pool uses.
    let inner_callback = Arc::clone(service.thread_pool().callback());
    let error = Error::new("late batch", "job", Severity::Warning);
    let report = ServiceEvent::new(Arc::clone(&inner_callback), Event::from(error), true);
    service
        .deliver_now(Arc::new(report), None, EnqueueStrategy::Default)
        .unwrap();

    let shutdown = ServiceEvent::shutdown(inner_callback, "job");
    service
        .deliver_now(Arc::new(shutdown), None, EnqueueStrategy::Default)
        .unwrap();

    assert!(wait_until(DEFAULT_TIMEOUT, || events.lock().unwrap().len() == 2));
    service.stop().unwrap();
    service.wait().unwrap();

    let events = events.lock().unwrap();

    // Two workers: the two reports may arrive in either order.
    let forwarded = events.iter().find_map(Event::as_error).unwrap();
    assert_eq!(forwarded.source(), "forwarder");
    assert_eq!(forwarded.severity(), Severity::Warning);
    assert_eq!(
        forwarded.description(),
        "CompoundService::notify: forwarding warning received from job. Description:\nlate batch"
    );

    // Non-error events pass through untouched.
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::Shutdown { source } if source == "job")));
}

#[test]
fn test_start_twice_and_stop_twice() {
    let (service, _) = service("twice");

    assert!(service.start().unwrap());
    assert!(!service.start().unwrap());
    assert!(service.stop().unwrap());
    assert!(!service.stop().unwrap());
    service.wait().unwrap();
}
