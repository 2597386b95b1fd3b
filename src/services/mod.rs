//! Service layer module root.
//! Orchestration over the domain types and adapter seams.

pub mod detector;
pub mod device;
pub mod provisioning;
pub mod termination;

pub use detector::{DeviceDetector, ExclusiveLock, PresenceSnapshot, DEFAULT_POLL_INTERVAL};
pub use device::{read_certificate, read_status, toggle_ccid, DeviceStatus};
pub use provisioning::{enroll, reset_pin, EnrollmentOutcome};
pub use termination::{factory_reset, revoke, terminate};
