//! Provisioning workflows: enroll and PIN reset.
//!
//! Ordering rule for enroll: every device-side step completes before the
//! store is touched, so a failed provisioning attempt can never leave a
//! ghost record for a device that was not actually provisioned.

use chrono::Utc;
use rand::rngs::OsRng;

use crate::adapters::ca::CaClient;
use crate::adapters::transport::TransportProvider;
use crate::domain::{
    CertificateDetails, DeviceVersions, EnrolledDevice, ManagementKey, PivPin, PivPuk,
};
use crate::infra::error::{EnrollmentError, EnrollmentResult};
use crate::infra::settings::Settings;
use crate::infra::store::EnrollmentStore;
use crate::services::detector::DeviceDetector;

/// Result of a successful enrollment: the persisted record plus the secret
/// material to hand to the user. The station keeps no copy of the PIN/PUK.
#[derive(Debug)]
pub struct EnrollmentOutcome {
    pub record: EnrolledDevice,
    pub pin: PivPin,
    pub puk: PivPuk,
}

/// Enroll the inserted token for `username` against the configured CA.
///
/// One exclusive-lock scope covers the whole device visit: virgin check,
/// key material rotation, 9a keypair generation, certificate issuance and
/// import. The store is only mutated (insert + save) after the session
/// closed successfully.
///
/// # Errors
///
/// - [`EnrollmentError::Authentication`] if the device rejects the
///   factory-default management key (already provisioned).
/// - [`EnrollmentError::Store`] if the serial is already enrolled.
/// - Any transport or CA failure, with the store left untouched.
pub fn enroll(
    detector: &DeviceDetector,
    provider: &dyn TransportProvider,
    ca: &dyn CaClient,
    settings: &Settings,
    store: &mut EnrollmentStore,
    username: &str,
) -> EnrollmentResult<EnrollmentOutcome> {
    let (record, pin, puk) = {
        let _lock = detector.exclusive();
        let mut session = provider.open()?;

        let serial = session.serial()?;
        if store.get(serial).is_some() {
            return Err(EnrollmentError::Store(format!(
                "device {serial} is already enrolled"
            )));
        }

        // Virgin check: an unprovisioned device accepts the default key.
        if !session.authenticate(&ManagementKey::factory_default())? {
            return Err(EnrollmentError::Authentication(format!(
                "device {serial} rejects the default management key; it is already provisioned"
            )));
        }

        log::info!("enrolling device {serial} for {username}");

        let management_key = ManagementKey::generate(&mut OsRng);
        let pin = PivPin::generate(&mut OsRng);
        let puk = PivPuk::generate(&mut OsRng);

        session.set_management_key(&management_key)?;
        session.change_pin(&PivPin::factory_default(), &pin)?;
        session.change_puk(&PivPuk::factory_default(), &puk)?;

        let public_key = session.generate_key_9a()?;
        let certificate_der = ca.issue(&settings.ca_name, username, &public_key)?;
        session.import_certificate_9a(&certificate_der)?;

        // Read back what the device actually holds.
        let stored_der = session.certificate_9a()?.ok_or_else(|| {
            EnrollmentError::Transport(
                "certificate import reported success but slot 9a is empty".to_string(),
            )
        })?;

        let record = EnrolledDevice {
            device_serial: serial,
            username: username.to_string(),
            enrolled_at: Utc::now(),
            ca: settings.ca_name.clone(),
            versions: DeviceVersions {
                firmware: session.version()?,
                piv_applet: session.piv_version()?,
            },
            certificate: CertificateDetails::from_der(&stored_der)?,
        };

        (record, pin, puk)
        // Session and lock released here; the device visit is over.
    };

    store.add(record.clone())?;
    store.save()?;

    log::info!(
        "device {} enrolled for {} (certificate {})",
        record.device_serial,
        record.username,
        record.certificate.serial
    );

    Ok(EnrollmentOutcome { record, pin, puk })
}

/// Reset the PIN on the device enrolled as `expected_serial`, using the PUK.
///
/// Single lock scope, no store mutation.
///
/// # Errors
///
/// [`EnrollmentError::DeviceUnavailable`] if the inserted device is not the
/// expected one; [`EnrollmentError::Authentication`] on a rejected PUK.
pub fn reset_pin(
    detector: &DeviceDetector,
    provider: &dyn TransportProvider,
    expected_serial: u32,
    puk: &PivPuk,
    new_pin: &PivPin,
) -> EnrollmentResult<()> {
    let _lock = detector.exclusive();
    let mut session = provider.open()?;

    let serial = session.serial()?;
    if serial != expected_serial {
        return Err(EnrollmentError::DeviceUnavailable(format!(
            "inserted device {serial} does not match expected {expected_serial}"
        )));
    }

    session.unblock_pin(puk, new_pin)?;
    log::info!("PIN reset on device {serial}");
    Ok(())
}
