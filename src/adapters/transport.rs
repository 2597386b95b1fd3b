//! Device transport traits.
//!
//! [`DeviceTransport`] is one open session to one physical token; it owns
//! the underlying connection and releases it on drop. The transport is not
//! safe for concurrent use, so every session must be opened and driven while
//! holding the detector's exclusive lock (see `services::detector`).
//!
//! [`TransportProvider`] opens sessions; backends implement it for real
//! hardware (feature `pcsc-backend`) and for the in-memory mock device.

use crate::domain::{InterfaceMode, ManagementKey, PivPin, PivPuk};
use crate::infra::error::EnrollmentResult;

/// One live session to a physical token.
///
/// All methods are blocking and must only be invoked while holding the
/// access arbiter. Methods take `&mut self` because the underlying
/// command/response framing is stateful.
pub trait DeviceTransport: Send + std::fmt::Debug {
    /// Authenticate with the PIV management key. Returns `false` for a
    /// rejected key; transport failures are errors.
    fn authenticate(&mut self, key: &ManagementKey) -> EnrollmentResult<bool>;

    /// Replace the management key. Requires prior authentication.
    fn set_management_key(&mut self, key: &ManagementKey) -> EnrollmentResult<()>;

    /// Change the PIN, proving knowledge of the current one.
    fn change_pin(&mut self, current: &PivPin, new: &PivPin) -> EnrollmentResult<()>;

    /// Change the PUK, proving knowledge of the current one.
    fn change_puk(&mut self, current: &PivPuk, new: &PivPuk) -> EnrollmentResult<()>;

    /// Reset the PIN using the PUK.
    fn unblock_pin(&mut self, puk: &PivPuk, new_pin: &PivPin) -> EnrollmentResult<()>;

    /// Read the current interface mode.
    fn mode(&mut self) -> EnrollmentResult<InterfaceMode>;

    /// Write a new interface mode. Takes effect on device re-plug.
    fn set_mode(&mut self, mode: InterfaceMode) -> EnrollmentResult<()>;

    /// Device serial number.
    fn serial(&mut self) -> EnrollmentResult<u32>;

    /// Device firmware version string.
    fn version(&mut self) -> EnrollmentResult<String>;

    /// PIV applet version string.
    fn piv_version(&mut self) -> EnrollmentResult<String>;

    /// Remaining PIN retry count.
    fn pin_tries_left(&mut self) -> EnrollmentResult<u8>;

    /// Deliberately exhaust the PIN retry counter.
    fn block_pin(&mut self) -> EnrollmentResult<()>;

    /// Deliberately exhaust the PUK retry counter.
    fn block_puk(&mut self) -> EnrollmentResult<()>;

    /// Factory-reset the PIV applet. Only succeeds after both retry
    /// counters are exhausted. `Ok(false)` means the device refused the
    /// reset (left blocked but not wiped).
    fn reset_device(&mut self) -> EnrollmentResult<bool>;

    /// Generate a fresh keypair in slot 9a, returning the DER
    /// `SubjectPublicKeyInfo`. Requires prior authentication.
    fn generate_key_9a(&mut self) -> EnrollmentResult<Vec<u8>>;

    /// Import a DER certificate into slot 9a. Requires prior authentication.
    fn import_certificate_9a(&mut self, der: &[u8]) -> EnrollmentResult<()>;

    /// Read the DER certificate from slot 9a, if any.
    fn certificate_9a(&mut self) -> EnrollmentResult<Option<Vec<u8>>>;
}

/// Opens transport sessions.
///
/// `open` failing with [`EnrollmentError::DeviceUnavailable`] is the normal
/// "no token inserted" signal; the presence poller relies on it.
///
/// [`EnrollmentError::DeviceUnavailable`]: crate::infra::error::EnrollmentError::DeviceUnavailable
pub trait TransportProvider: Send + Sync {
    fn open(&self) -> EnrollmentResult<Box<dyn DeviceTransport>>;
}
