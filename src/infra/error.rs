//! Error types for enrollment-station operations.
//! Error handling types and result definitions shared across the crate.

use thiserror::Error;

/// Result type for enrollment operations
pub type EnrollmentResult<T> = Result<T, EnrollmentError>;

/// Error taxonomy for the enrollment station.
///
/// Device and CA failures always propagate to the workflow boundary as
/// distinguishable variants; the core never retries on its own.
#[derive(Error, Debug, miette::Diagnostic)]
pub enum EnrollmentError {
    /// An interface-mode byte that is not one of the legal values, or a
    /// transition that would leave no interface enabled. Indicates a bug or
    /// corrupted device state, never silently coerced.
    #[error("invalid interface mode: {0}")]
    InvalidMode(String),

    /// No token present, or the inserted token is not the expected one.
    /// Recoverable by re-presenting the correct device.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Management key or PIN rejected by the device.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The certificate authority refused or failed the revocation. The CA's
    /// message is carried verbatim; the enrollment record is left in place.
    #[error("revocation failed: {0}")]
    Revocation(String),

    /// PIN and PUK were blocked but the final applet reset did not complete.
    /// The device is in a blocked-but-not-wiped state.
    #[error("device reset incomplete: {0}")]
    #[diagnostic(help(
        "The PIN and PUK retry counters are exhausted but the PIV applet was \
         not reset. Reset the device manually with an external tool."
    ))]
    PartialReset(String),

    /// A transport-level command failed.
    #[error("device transport error: {0}")]
    Transport(String),

    /// Certificate parsing, encoding, or issuance failure.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// Enrollment store load/save/consistency failure.
    #[error("enrollment store error: {0}")]
    Store(String),

    /// Settings file missing or malformed.
    #[error("settings error: {0}")]
    Settings(String),

    #[error("I/O error: {0}")]
    Io(String),

    /// Input validation failure (PIN format, serial parse, and similar).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<std::io::Error> for EnrollmentError {
    fn from(error: std::io::Error) -> Self {
        EnrollmentError::Io(error.to_string())
    }
}

impl From<der::Error> for EnrollmentError {
    fn from(error: der::Error) -> Self {
        EnrollmentError::Certificate(error.to_string())
    }
}
