//! Enrollment Station Library
//!
//! Binds smart-card-capable hardware tokens to CA-issued X.509
//! certificates and tracks the bindings for later revocation or device
//! retirement. The hard parts live in three places: the interface-mode
//! state machine (`domain::mode`), the presence poller and access arbiter
//! serializing all physical-device access (`services::detector`), and the
//! provisioning/termination workflows that keep the persisted enrollment
//! store consistent with irreversible device and CA operations
//! (`services::provisioning`, `services::termination`).

pub mod adapters;
pub mod domain;
pub mod infra;
pub mod services;

pub use adapters::{CaClient, DeviceTransport, EntropySource, TransportProvider};
pub use domain::{
    CertificateDetails, DeviceVersions, EnrolledDevice, InterfaceMode, ManagementKey, PivPin,
    PivPuk,
};
pub use infra::error::{EnrollmentError, EnrollmentResult};
pub use infra::settings::{Settings, SettingsManager, SETTINGS_FILE};
pub use infra::store::{EnrollmentStore, STORE_FILE};
pub use services::{DeviceDetector, DeviceStatus, ExclusiveLock, PresenceSnapshot};
