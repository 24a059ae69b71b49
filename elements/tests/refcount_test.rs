// Integration tests for intrusive reference counting

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use elements::error::RefCountError;
use elements::refcount::{NullSync, RefCount, RefCounted, SmartPtr, ThreadSync};
use elements::{impl_ref_counted, upcast};

struct Connection {
    port: u16,
    drops: Arc<AtomicUsize>,
    refs: RefCount<ThreadSync>,
}

impl_ref_counted!(Connection, refs);

impl Drop for Connection {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

fn connection(port: u16, drops: &Arc<AtomicUsize>) -> SmartPtr<Connection> {
    SmartPtr::new(Connection {
        port,
        drops: Arc::clone(drops),
        refs: RefCount::new(),
    })
}

trait Endpoint: RefCounted + Send + Sync {
    fn port(&self) -> u16;
}

impl Endpoint for Connection {
    fn port(&self) -> u16 {
        self.port
    }
}

#[test]
fn test_count_starts_at_one() {
    let counter: RefCount<NullSync> = RefCount::new();
    assert_eq!(counter.value(), 1);

    counter.add_ref();
    assert_eq!(counter.value(), 2);
    assert!(!counter.remove_ref());
    assert!(counter.remove_ref());
}

#[test]
fn test_remove_ref_at_zero_is_refused() {
    let counter: RefCount<ThreadSync> = RefCount::new();
    assert!(counter.remove_ref());

    // Already zero: logged, never a second "destroy now".
    assert!(!counter.remove_ref());
    assert_eq!(counter.value(), 0);
}

#[test]
fn test_concurrent_owners_destroy_exactly_once() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 1000;

    let drops = Arc::new(AtomicUsize::new(0));
    let ptr = connection(8080, &drops);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let local = ptr.clone();
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let extra = local.clone();
                    assert!(extra.refcount_value() >= 2);
                    drop(extra);
                }
                local
            })
        })
        .collect();

    let returned: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ptr.refcount_value(), THREADS + 1);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    drop(returned);
    assert_eq!(ptr.refcount_value(), 1);

    drop(ptr);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_upcast_shares_the_count() {
    let drops = Arc::new(AtomicUsize::new(0));
    let concrete = connection(443, &drops);

    let endpoint: SmartPtr<dyn Endpoint> = upcast!(concrete.clone() => dyn Endpoint);
    assert_eq!(endpoint.port(), 443);
    assert_eq!(concrete.refcount_value(), 2);
    assert_eq!(endpoint.refcount_value(), 2);

    drop(concrete);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    // The last handle is the trait object; it still frees the concrete type.
    drop(endpoint);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_upcast_of_null_stays_null() {
    let null: SmartPtr<Connection> = SmartPtr::null();
    let endpoint: SmartPtr<dyn Endpoint> = upcast!(null => dyn Endpoint);

    assert!(endpoint.is_null());
    assert_eq!(endpoint.try_deref().err(), Some(RefCountError::NotInitialized));
}

#[test]
fn test_raw_handoff_between_threads() {
    let drops = Arc::new(AtomicUsize::new(0));
    let ptr = connection(22, &drops);

    // Hand the reference over as a plain address, the way it would cross
    // a foreign boundary.
    let addr = ptr.into_raw().unwrap().as_ptr() as usize;

    let port = thread::spawn(move || {
        let raw = std::ptr::NonNull::new(addr as *mut Connection).unwrap();
        let adopted = unsafe { SmartPtr::from_raw(raw) };
        assert_eq!(adopted.refcount_value(), 1);
        adopted.port
    })
    .join()
    .unwrap();

    assert_eq!(port, 22);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_release_reports_last_owner_exactly_once() {
    const OWNERS: usize = 16;

    let drops = Arc::new(AtomicUsize::new(0));
    let ptr = connection(9000, &drops);
    for _ in 1..OWNERS {
        ptr.add_ref();
    }

    // Every owner releases at once; only one of them may see `true`.
    let object = Arc::new(ptr.into_raw().unwrap().as_ptr() as usize);
    let last_owners: usize = (0..OWNERS)
        .map(|_| {
            let object = Arc::clone(&object);
            thread::spawn(move || {
                let conn = unsafe { &*(*object as *const Connection) };
                usize::from(conn.remove_ref())
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .sum();

    assert_eq!(last_owners, 1);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    let conn = unsafe { &*(*object as *const Connection) };
    assert_eq!(conn.refcount_value(), 0);
    assert!(!conn.remove_ref());

    // The winner of the race owns the allocation made by SmartPtr::new.
    drop(unsafe { Box::from_raw(*object as *mut Connection) });
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}
