//! Device presence detector and access arbiter.
//!
//! One background worker polls for token presence for the lifetime of the
//! process; one mutex serializes every physical-device access between that
//! worker and the foreground workflows. The transport corrupts its
//! command/response framing under concurrent use, so the rule is absolute:
//! no session is opened without holding an [`ExclusiveLock`].
//!
//! Subscribers get a unit "something changed" token and re-query current
//! state themselves; no payload rides along, so a notification can never
//! deliver a stale snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::adapters::transport::TransportProvider;

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

static DETECTOR: OnceLock<DeviceDetector> = OnceLock::new();

/// What the poller observed on its last cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceSnapshot {
    pub present: bool,
    /// Raw mode byte when it could be read; `None` when absent or unreadable.
    pub mode_byte: Option<u8>,
}

struct DetectorShared {
    provider: Box<dyn TransportProvider>,
    device_lock: Mutex<()>,
    subscribers: Mutex<Vec<Sender<()>>>,
    last: Mutex<Option<PresenceSnapshot>>,
    stopping: AtomicBool,
    interval: Duration,
}

/// Scoped exclusive hold on the physical device.
///
/// Released on drop on every exit path. Not reentrant: a holder must not
/// re-acquire within the same scope.
pub struct ExclusiveLock<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// Presence poller plus access arbiter.
///
/// Usually a process-wide singleton ([`DeviceDetector::init`] /
/// [`DeviceDetector::instance`]); standalone instances exist for tests.
pub struct DeviceDetector {
    shared: Arc<DetectorShared>,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceDetector {
    #[must_use]
    pub fn new(provider: Box<dyn TransportProvider>) -> Self {
        Self::with_interval(provider, DEFAULT_POLL_INTERVAL)
    }

    #[must_use]
    pub fn with_interval(provider: Box<dyn TransportProvider>, interval: Duration) -> Self {
        Self {
            shared: Arc::new(DetectorShared {
                provider,
                device_lock: Mutex::new(()),
                subscribers: Mutex::new(Vec::new()),
                last: Mutex::new(None),
                stopping: AtomicBool::new(false),
                interval,
            }),
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    /// Install the process-wide detector. The first call wins; later calls
    /// return the existing instance and drop their provider.
    pub fn init(provider: Box<dyn TransportProvider>) -> &'static DeviceDetector {
        DETECTOR.get_or_init(|| DeviceDetector::new(provider))
    }

    /// The process-wide detector, if [`DeviceDetector::init`] has run.
    #[must_use]
    pub fn instance() -> Option<&'static DeviceDetector> {
        DETECTOR.get()
    }

    /// Acquire exclusive device access, blocking until available.
    #[must_use]
    pub fn exclusive(&self) -> ExclusiveLock<'_> {
        ExclusiveLock {
            _guard: self
                .shared
                .device_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Acquire exclusive device access without blocking.
    #[must_use]
    pub fn try_exclusive(&self) -> Option<ExclusiveLock<'_>> {
        match self.shared.device_lock.try_lock() {
            Ok(guard) => Some(ExclusiveLock { _guard: guard }),
            Err(std::sync::TryLockError::Poisoned(poisoned)) => Some(ExclusiveLock {
                _guard: poisoned.into_inner(),
            }),
            Err(std::sync::TryLockError::WouldBlock) => None,
        }
    }

    /// Register for change notifications. Each token means "re-query".
    #[must_use]
    pub fn subscribe(&self) -> Receiver<()> {
        let (sender, receiver) = mpsc::channel();
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    /// Last snapshot the poller recorded, if any cycle completed yet.
    #[must_use]
    pub fn last_snapshot(&self) -> Option<PresenceSnapshot> {
        *self
            .shared
            .last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the background poller. Starting an already-running detector is
    /// a no-op.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            log::debug!("detector already running");
            return;
        }
        self.shared.stopping.store(false, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("presence-poller".to_string())
            .spawn(move || {
                log::info!("presence poller started");
                while !shared.stopping.load(Ordering::SeqCst) {
                    poll_once(&shared);
                    thread::sleep(shared.interval);
                }
                log::info!("presence poller stopped");
            })
            .unwrap_or_else(|e| panic!("failed to spawn presence poller: {e}"));

        *self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Stop the background poller and wait for it to exit.
    pub fn stop(&self) {
        self.shared.stopping.store(true, Ordering::SeqCst);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

fn poll_once(shared: &DetectorShared) {
    // Skip the cycle rather than queue behind a foreground workflow; the
    // next tick will catch up.
    let guard = match shared.device_lock.try_lock() {
        Ok(guard) => guard,
        Err(std::sync::TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        Err(std::sync::TryLockError::WouldBlock) => {
            log::trace!("device busy, skipping poll cycle");
            return;
        }
    };

    let snapshot = match shared.provider.open() {
        Ok(mut session) => {
            let mode_byte = session
                .mode()
                .ok()
                .and_then(|mode| mode.mode_byte().ok());
            PresenceSnapshot {
                present: true,
                mode_byte,
            }
        }
        Err(_) => PresenceSnapshot {
            present: false,
            mode_byte: None,
        },
    };
    drop(guard);

    let mut last = shared.last.lock().unwrap_or_else(PoisonError::into_inner);
    let changed = *last != Some(snapshot);
    *last = Some(snapshot);
    drop(last);

    if changed {
        log::debug!(
            "device state changed: present={} mode={:?}",
            snapshot.present,
            snapshot.mode_byte
        );
        let mut subscribers = shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Drop subscribers whose receiver is gone.
        subscribers.retain(|sender| sender.send(()).is_ok());
    }
}

impl Drop for DeviceDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockDeviceState, MockProvider};

    #[test]
    fn try_exclusive_fails_while_held() {
        let detector =
            DeviceDetector::new(Box::new(MockProvider::new(MockDeviceState::default())));
        let held = detector.exclusive();
        assert!(detector.try_exclusive().is_none());
        drop(held);
        assert!(detector.try_exclusive().is_some());
    }

    #[test]
    fn double_start_is_a_no_op() {
        let provider = MockProvider::new(MockDeviceState::default());
        let detector =
            DeviceDetector::with_interval(Box::new(provider), Duration::from_millis(10));
        detector.start();
        detector.start();
        detector.stop();
    }
}
