//! Arbiter and presence-poller behavior under contention.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use enrollment_station::adapters::mock::{MockDeviceState, MockProvider};
use enrollment_station::services::DeviceDetector;

const POLL: Duration = Duration::from_millis(20);

#[test]
fn exclusive_access_is_mutually_exclusive() {
    let detector = DeviceDetector::new(Box::new(MockProvider::new(MockDeviceState::default())));
    let inside = AtomicBool::new(false);
    let acquisitions = AtomicU32::new(0);

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..50 {
                    let _lock = detector.exclusive();
                    // Nobody else may be inside while we hold the lock.
                    assert!(!inside.swap(true, Ordering::SeqCst));
                    std::hint::spin_loop();
                    inside.store(false, Ordering::SeqCst);
                    acquisitions.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    // Every contender eventually got through.
    assert_eq!(acquisitions.load(Ordering::SeqCst), 8 * 50);
}

#[test]
fn subscribers_are_notified_on_presence_change() {
    let provider = MockProvider::new(MockDeviceState::default());
    let device = provider.state();
    let detector = DeviceDetector::with_interval(Box::new(provider), POLL);

    let changes = detector.subscribe();
    detector.start();

    // First completed cycle establishes the initial snapshot.
    changes
        .recv_timeout(Duration::from_secs(5))
        .expect("initial presence notification");
    let snapshot = detector.last_snapshot().expect("snapshot recorded");
    assert!(snapshot.present);
    assert!(snapshot.mode_byte.is_some());

    // Pull the token; the next differing cycle must notify again.
    device.lock().unwrap().present = false;
    changes
        .recv_timeout(Duration::from_secs(5))
        .expect("removal notification");
    let snapshot = detector.last_snapshot().expect("snapshot recorded");
    assert!(!snapshot.present);
    assert_eq!(snapshot.mode_byte, None);

    detector.stop();
}

#[test]
fn poller_skips_cycles_while_the_lock_is_held() {
    let provider = MockProvider::new(MockDeviceState::default());
    let device = provider.state();
    let detector = DeviceDetector::with_interval(Box::new(provider), POLL);

    let changes = detector.subscribe();
    let held = detector.exclusive();
    detector.start();

    // Several intervals pass; no session may be opened behind our back.
    thread::sleep(POLL * 5);
    assert_eq!(device.lock().unwrap().opens, 0);

    drop(held);

    // With the lock released, polling resumes and a snapshot appears.
    changes
        .recv_timeout(Duration::from_secs(5))
        .expect("notification after lock release");
    assert!(device.lock().unwrap().opens > 0);

    detector.stop();
}

#[test]
fn dropped_subscribers_do_not_wedge_the_poller() {
    let provider = MockProvider::new(MockDeviceState::default());
    let device = provider.state();
    let detector = DeviceDetector::with_interval(Box::new(provider), POLL);

    let dead = detector.subscribe();
    drop(dead);

    let live = detector.subscribe();
    detector.start();

    live.recv_timeout(Duration::from_secs(5))
        .expect("live subscriber still notified");

    device.lock().unwrap().present = false;
    live.recv_timeout(Duration::from_secs(5))
        .expect("change delivered after dead subscriber pruned");

    detector.stop();
}
