//! Device status reads and mode operations.

use crate::adapters::transport::TransportProvider;
use crate::domain::{InterfaceMode, ManagementKey};
use crate::infra::error::{EnrollmentError, EnrollmentResult};
use crate::services::detector::DeviceDetector;

/// Point-in-time readout of the inserted token.
#[derive(Debug, Clone)]
pub struct DeviceStatus {
    pub serial: u32,
    pub firmware: String,
    pub piv_applet: String,
    pub mode: InterfaceMode,
    pub pin_tries_left: u8,
    /// Heuristic: the device no longer accepts the factory-default
    /// management key, so something has provisioned it.
    pub enrolled: bool,
}

/// Read the inserted token's status under the access arbiter.
pub fn read_status(
    detector: &DeviceDetector,
    provider: &dyn TransportProvider,
) -> EnrollmentResult<DeviceStatus> {
    let _lock = detector.exclusive();
    let mut session = provider.open()?;

    let serial = session.serial()?;
    let firmware = session.version()?;
    let piv_applet = session.piv_version()?;
    let mode = session.mode()?;
    let pin_tries_left = session.pin_tries_left()?;
    let enrolled = !session.authenticate(&ManagementKey::factory_default())?;

    Ok(DeviceStatus {
        serial,
        firmware,
        piv_applet,
        mode,
        pin_tries_left,
        enrolled,
    })
}

/// Toggle the CCID interface on the inserted token.
///
/// Returns the mode written to the device; it takes effect once the token
/// is re-plugged.
pub fn toggle_ccid(
    detector: &DeviceDetector,
    provider: &dyn TransportProvider,
) -> EnrollmentResult<InterfaceMode> {
    let _lock = detector.exclusive();
    let mut session = provider.open()?;

    let current = session.mode()?;
    let next = current.toggled_ccid()?;
    session.set_mode(next)?;

    log::info!("interface mode changed: {current} -> {next}");
    Ok(next)
}

/// Read the certificate from slot 9a of the device inserted as
/// `expected_serial`, if any. Serves certificate view/export straight from
/// the hardware, without consulting the store.
pub fn read_certificate(
    detector: &DeviceDetector,
    provider: &dyn TransportProvider,
    expected_serial: u32,
) -> EnrollmentResult<Option<Vec<u8>>> {
    let _lock = detector.exclusive();
    let mut session = provider.open()?;

    let serial = session.serial()?;
    if serial != expected_serial {
        return Err(EnrollmentError::DeviceUnavailable(format!(
            "inserted device {serial} does not match expected {expected_serial}"
        )));
    }

    session.certificate_9a()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockDeviceState, MockProvider};
    use crate::domain::ManagementKey;

    #[test]
    fn status_reports_virgin_device_as_unenrolled() {
        let provider = MockProvider::new(MockDeviceState::default());
        let detector = DeviceDetector::new(Box::new(MockProvider::new(
            MockDeviceState::default(),
        )));

        let status = read_status(&detector, &provider).unwrap();
        assert_eq!(status.serial, 123_456);
        assert!(!status.enrolled);
        assert_eq!(status.pin_tries_left, 3);
    }

    #[test]
    fn status_reports_provisioned_device_as_enrolled() {
        let mut state = MockDeviceState::default();
        state.management_key = ManagementKey::new([0x42; 24]);
        let provider = MockProvider::new(state);
        let detector = DeviceDetector::new(Box::new(MockProvider::new(
            MockDeviceState::default(),
        )));

        let status = read_status(&detector, &provider).unwrap();
        assert!(status.enrolled);
    }

    #[test]
    fn read_certificate_returns_the_slot_contents() {
        let mut state = MockDeviceState::default();
        state.certificate_9a = Some(vec![0x30, 0x03, 0x02, 0x01, 0x01]);
        let provider = MockProvider::new(state);
        let detector = DeviceDetector::new(Box::new(MockProvider::new(
            MockDeviceState::default(),
        )));

        let der = read_certificate(&detector, &provider, 123_456).unwrap();
        assert_eq!(der, Some(vec![0x30, 0x03, 0x02, 0x01, 0x01]));
    }

    #[test]
    fn read_certificate_on_empty_slot_is_none() {
        let provider = MockProvider::new(MockDeviceState::default());
        let detector = DeviceDetector::new(Box::new(MockProvider::new(
            MockDeviceState::default(),
        )));

        assert_eq!(read_certificate(&detector, &provider, 123_456).unwrap(), None);
    }

    #[test]
    fn read_certificate_rejects_the_wrong_device() {
        let provider = MockProvider::new(MockDeviceState::default());
        let detector = DeviceDetector::new(Box::new(MockProvider::new(
            MockDeviceState::default(),
        )));

        let err = read_certificate(&detector, &provider, 42).unwrap_err();
        assert!(matches!(err, EnrollmentError::DeviceUnavailable(_)));
    }

    #[test]
    fn toggle_ccid_writes_the_new_mode() {
        let provider = MockProvider::new(MockDeviceState::default()); // OTP+CCID
        let state = provider.state();
        let detector = DeviceDetector::new(Box::new(MockProvider::new(
            MockDeviceState::default(),
        )));

        let next = toggle_ccid(&detector, &provider).unwrap();
        assert!(!next.is_ccid_active());
        assert_eq!(state.lock().unwrap().mode, next);

        let back = toggle_ccid(&detector, &provider).unwrap();
        assert!(back.is_ccid_active());
    }
}
