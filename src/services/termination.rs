//! Termination workflows: factory reset, revoke, terminate.
//!
//! The rollback policy is deliberately asymmetric. Revocation commits to
//! the store the moment the CA confirms it, and is never undone to match a
//! later device failure: a certificate that the CA has revoked must stay
//! revoked, whatever state the hardware ends up in. The reverse also holds;
//! a failed revocation never wipes the device, so the binding stays on
//! record while the certificate is still valid.

use crate::adapters::ca::CaClient;
use crate::adapters::transport::TransportProvider;
use crate::domain::EnrolledDevice;
use crate::infra::error::{EnrollmentError, EnrollmentResult};
use crate::infra::store::EnrollmentStore;
use crate::services::detector::DeviceDetector;

/// Wipe the device enrolled as `expected_serial`.
///
/// Strictly ordered inside one exclusive-lock scope: verify the inserted
/// device is the expected one, exhaust the PIN retry counter, exhaust the
/// PUK retry counter, then issue the applet reset. The applet only accepts
/// a reset once both counters are exhausted; the deliberate self-lockout is
/// the only reliable reset path.
///
/// # Errors
///
/// - [`EnrollmentError::DeviceUnavailable`] if the wrong device is
///   inserted; nothing destructive has happened yet.
/// - [`EnrollmentError::PartialReset`] if the final reset is refused: the
///   device is left blocked but not wiped, a user-actionable state, not a
///   crash.
pub fn factory_reset(
    detector: &DeviceDetector,
    provider: &dyn TransportProvider,
    expected_serial: u32,
) -> EnrollmentResult<()> {
    let _lock = detector.exclusive();
    let mut session = provider.open()?;

    let serial = session.serial()?;
    if serial != expected_serial {
        return Err(EnrollmentError::DeviceUnavailable(format!(
            "inserted device {serial} does not match expected {expected_serial}"
        )));
    }

    log::warn!("factory-resetting device {serial}");

    session.block_pin()?;
    session.block_puk()?;

    if !session.reset_device()? {
        return Err(EnrollmentError::PartialReset(format!(
            "device {serial} refused the applet reset after PIN/PUK blocking"
        )));
    }

    log::info!("device {serial} wiped");
    Ok(())
}

/// Revoke the certificate bound to `device_serial` and drop its record.
///
/// The store is only mutated after the CA confirms the revocation; a CA
/// failure propagates verbatim with the record left in place, so the
/// binding is never lost while the certificate is still valid.
pub fn revoke(
    ca: &dyn CaClient,
    store: &mut EnrollmentStore,
    device_serial: u32,
) -> EnrollmentResult<EnrolledDevice> {
    let record = store
        .get(device_serial)
        .ok_or_else(|| {
            EnrollmentError::Store(format!("no enrollment found for device {device_serial}"))
        })?
        .clone();

    ca.revoke(&record.ca, &record.certificate.serial)?;

    // Revocation confirmed; committing the removal is now mandatory.
    store.remove(device_serial);
    store.save()?;

    log::info!(
        "revoked certificate {} of {} for device {}",
        record.certificate.serial,
        record.ca,
        device_serial
    );
    Ok(record)
}

/// Retire a device: revoke its certificate, then wipe it, in that order.
///
/// Revoke-first is load-bearing: wiping first would make the device
/// unavailable for a retry while its certificate remained valid. If the
/// revocation succeeds but the wipe fails, the removal stays committed and
/// [`EnrollmentError::PartialReset`] surfaces the device's blocked state.
pub fn terminate(
    detector: &DeviceDetector,
    provider: &dyn TransportProvider,
    ca: &dyn CaClient,
    store: &mut EnrollmentStore,
    device_serial: u32,
) -> EnrollmentResult<()> {
    let record = revoke(ca, store, device_serial)?;
    factory_reset(detector, provider, record.device_serial)
}
