//! Domain layer: pure types and logic with no I/O.

pub mod constants;
pub mod enrollment;
pub mod mode;
pub mod types;

pub use enrollment::{CertificateDetails, DeviceVersions, EnrolledDevice};
pub use mode::InterfaceMode;
pub use types::{ManagementKey, PivPin, PivPuk};
