//! Provisioning and termination workflow properties, driven through the
//! mock device and scripted CA client.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use enrollment_station::adapters::ca::MockCaClient;
use enrollment_station::adapters::mock::{MockDeviceState, MockProvider};
use enrollment_station::domain::{
    CertificateDetails, DeviceVersions, EnrolledDevice, ManagementKey, PivPin, PivPuk,
};
use enrollment_station::infra::settings::Settings;
use enrollment_station::infra::store::EnrollmentStore;
use enrollment_station::services::{self, DeviceDetector};
use enrollment_station::EnrollmentError;

const CERT_DER: &[u8] = include_bytes!("data/enrolled-cert.der");
const SPKI_DER: &[u8] = include_bytes!("data/device-key-spki.der");

struct Fixture {
    _dir: tempfile::TempDir,
    store_path: PathBuf,
    detector: DeviceDetector,
    provider: MockProvider,
    settings: Settings,
}

fn fixture(state: MockDeviceState) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("store.json");
    // The detector only arbitrates; its own provider is never polled here.
    let detector = DeviceDetector::new(Box::new(MockProvider::new(MockDeviceState::default())));
    let provider = MockProvider::new(state);
    let mut settings = Settings::default();
    settings.ca_name = "RootCA".to_string();
    Fixture {
        _dir: dir,
        store_path,
        detector,
        provider,
        settings,
    }
}

fn enrolled_record(serial: u32) -> EnrolledDevice {
    EnrolledDevice {
        device_serial: serial,
        username: "jdoe".to_string(),
        enrolled_at: Utc::now(),
        ca: "RootCA".to_string(),
        versions: DeviceVersions {
            firmware: "3.4.9".to_string(),
            piv_applet: "1.0.4".to_string(),
        },
        certificate: CertificateDetails::from_der(CERT_DER).unwrap(),
    }
}

fn virgin_state() -> MockDeviceState {
    MockDeviceState {
        next_public_key: SPKI_DER.to_vec(),
        ..MockDeviceState::default()
    }
}

// ---- Enroll ----

#[test]
fn enroll_provisions_device_then_persists_record() {
    let f = fixture(virgin_state());
    let device = f.provider.state();
    let ca = MockCaClient::issuing(CERT_DER.to_vec());
    let mut store = EnrollmentStore::load(&f.store_path).unwrap();

    let outcome = services::enroll(
        &f.detector,
        &f.provider,
        &ca,
        &f.settings,
        &mut store,
        "jdoe",
    )
    .unwrap();

    assert_eq!(outcome.record.device_serial, 123_456);
    assert_eq!(outcome.record.ca, "RootCA");
    assert_eq!(outcome.record.certificate.raw_der, CERT_DER);
    assert_eq!(outcome.pin.as_str().len(), 6);
    assert_eq!(outcome.puk.as_str().len(), 8);

    // Device-side effects happened.
    let device = device.lock().unwrap();
    assert!(!device.management_key.is_factory_default());
    assert_ne!(device.pin, PivPin::factory_default());
    assert!(device.key_9a_present);
    assert_eq!(device.certificate_9a.as_deref(), Some(CERT_DER));

    // Record was persisted and survives a reload.
    let reloaded = EnrollmentStore::load(&f.store_path).unwrap();
    assert_eq!(reloaded.len(), 1);
    assert!(reloaded.get(123_456).is_some());

    assert_eq!(ca.issuances(), vec![("RootCA".to_string(), "jdoe".to_string())]);
}

#[test]
fn enroll_aborts_before_store_mutation_on_transport_failure() {
    let mut state = virgin_state();
    state.fail_import = true;
    let f = fixture(state);
    let ca = MockCaClient::issuing(CERT_DER.to_vec());

    // Seed the store so we can compare file bytes before and after.
    let mut store = EnrollmentStore::load(&f.store_path).unwrap();
    store.add(enrolled_record(999)).unwrap();
    store.save().unwrap();
    let before = fs::read(&f.store_path).unwrap();

    let err = services::enroll(
        &f.detector,
        &f.provider,
        &ca,
        &f.settings,
        &mut store,
        "jdoe",
    )
    .unwrap_err();
    assert!(matches!(err, EnrollmentError::Transport(_)));

    // The store, in memory and on disk, is untouched.
    assert_eq!(store.len(), 1);
    assert!(store.get(123_456).is_none());
    assert_eq!(fs::read(&f.store_path).unwrap(), before);
}

#[test]
fn enroll_rejects_already_provisioned_device() {
    let mut state = virgin_state();
    state.management_key = ManagementKey::new([0x42; 24]);
    let f = fixture(state);
    let device = f.provider.state();
    let ca = MockCaClient::issuing(CERT_DER.to_vec());
    let mut store = EnrollmentStore::load(&f.store_path).unwrap();

    let err = services::enroll(
        &f.detector,
        &f.provider,
        &ca,
        &f.settings,
        &mut store,
        "jdoe",
    )
    .unwrap_err();

    assert!(matches!(err, EnrollmentError::Authentication(_)));
    assert!(store.is_empty());
    assert!(!f.store_path.exists());
    // Nothing was issued for a device we could not provision.
    assert!(ca.issuances().is_empty());
    assert!(!device.lock().unwrap().key_9a_present);
}

#[test]
fn enroll_rejects_duplicate_serial_before_touching_the_device() {
    let f = fixture(virgin_state());
    let device = f.provider.state();
    let ca = MockCaClient::issuing(CERT_DER.to_vec());

    let mut store = EnrollmentStore::load(&f.store_path).unwrap();
    store.add(enrolled_record(123_456)).unwrap();

    let err = services::enroll(
        &f.detector,
        &f.provider,
        &ca,
        &f.settings,
        &mut store,
        "jdoe",
    )
    .unwrap_err();

    assert!(matches!(err, EnrollmentError::Store(_)));
    let device = device.lock().unwrap();
    assert!(device.management_key.is_factory_default());
    assert!(!device.key_9a_present);
}

#[test]
fn enroll_aborts_when_the_ca_refuses_issuance() {
    let f = fixture(virgin_state());
    let mut ca = MockCaClient::issuing(CERT_DER.to_vec());
    ca.issue_failure = Some("CA unreachable".to_string());
    let mut store = EnrollmentStore::load(&f.store_path).unwrap();

    let err = services::enroll(
        &f.detector,
        &f.provider,
        &ca,
        &f.settings,
        &mut store,
        "jdoe",
    )
    .unwrap_err();

    assert!(matches!(err, EnrollmentError::Certificate(_)));
    assert!(store.is_empty());
    assert!(!f.store_path.exists());
}

#[test]
fn enrolled_certificate_is_exportable_from_the_device() {
    let f = fixture(virgin_state());
    let ca = MockCaClient::issuing(CERT_DER.to_vec());
    let mut store = EnrollmentStore::load(&f.store_path).unwrap();

    services::enroll(
        &f.detector,
        &f.provider,
        &ca,
        &f.settings,
        &mut store,
        "jdoe",
    )
    .unwrap();

    // The slot readout matches what the CA issued, without the store.
    let der = services::read_certificate(&f.detector, &f.provider, 123_456).unwrap();
    assert_eq!(der.as_deref(), Some(CERT_DER));
}

// ---- Reset PIN ----

#[test]
fn reset_pin_uses_the_puk_and_leaves_the_store_alone() {
    let f = fixture(MockDeviceState::default());
    let device = f.provider.state();

    let new_pin = PivPin::new("998877").unwrap();
    services::reset_pin(
        &f.detector,
        &f.provider,
        123_456,
        &PivPuk::factory_default(),
        &new_pin,
    )
    .unwrap();

    assert_eq!(device.lock().unwrap().pin, new_pin);
    assert!(!f.store_path.exists());
}

#[test]
fn reset_pin_rejects_the_wrong_device() {
    let f = fixture(MockDeviceState::default());
    let err = services::reset_pin(
        &f.detector,
        &f.provider,
        111_111,
        &PivPuk::factory_default(),
        &PivPin::new("998877").unwrap(),
    )
    .unwrap_err();
    assert!(matches!(err, EnrollmentError::DeviceUnavailable(_)));
}

// ---- Factory reset ----

#[test]
fn factory_reset_blocks_then_wipes() {
    let f = fixture(MockDeviceState::default());
    let device = f.provider.state();

    services::factory_reset(&f.detector, &f.provider, 123_456).unwrap();

    let device = device.lock().unwrap();
    assert!(device.management_key.is_factory_default());
    assert_eq!(device.pin_tries, 3);
    assert!(device.certificate_9a.is_none());
}

#[test]
fn factory_reset_serial_mismatch_is_non_destructive() {
    let f = fixture(MockDeviceState::default());
    let device = f.provider.state();

    let err = services::factory_reset(&f.detector, &f.provider, 42).unwrap_err();
    assert!(matches!(err, EnrollmentError::DeviceUnavailable(_)));

    // No counter was touched.
    let device = device.lock().unwrap();
    assert_eq!(device.pin_tries, 3);
    assert_eq!(device.puk_tries, 3);
}

#[test]
fn refused_reset_surfaces_partial_reset() {
    let mut state = MockDeviceState::default();
    state.fail_reset = true;
    let f = fixture(state);
    let device = f.provider.state();

    let err = services::factory_reset(&f.detector, &f.provider, 123_456).unwrap_err();
    assert!(matches!(err, EnrollmentError::PartialReset(_)));

    // Blocked but not wiped: the documented manual-recovery state.
    let device = device.lock().unwrap();
    assert_eq!(device.pin_tries, 0);
    assert_eq!(device.puk_tries, 0);
}

// ---- Revoke ----

#[test]
fn revoke_success_removes_and_persists() {
    let f = fixture(MockDeviceState::default());
    let ca = MockCaClient::issuing(Vec::new());

    let mut store = EnrollmentStore::load(&f.store_path).unwrap();
    let record = enrolled_record(123_456);
    let cert_serial = record.certificate.serial.clone();
    store.add(record).unwrap();
    store.save().unwrap();

    services::revoke(&ca, &mut store, 123_456).unwrap();

    assert!(store.is_empty());
    let reloaded = EnrollmentStore::load(&f.store_path).unwrap();
    assert!(reloaded.is_empty());
    assert_eq!(ca.revocations(), vec![("RootCA".to_string(), cert_serial)]);
}

#[test]
fn failed_revoke_keeps_the_record() {
    let f = fixture(MockDeviceState::default());
    let mut ca = MockCaClient::issuing(Vec::new());
    ca.revoke_failure = Some("certificate not found in CA database".to_string());

    let mut store = EnrollmentStore::load(&f.store_path).unwrap();
    store.add(enrolled_record(123_456)).unwrap();
    store.save().unwrap();
    let before = fs::read(&f.store_path).unwrap();

    let err = services::revoke(&ca, &mut store, 123_456).unwrap_err();

    // Message passthrough, record intact, file untouched.
    assert_eq!(
        err.to_string(),
        "revocation failed: certificate not found in CA database"
    );
    assert!(store.get(123_456).is_some());
    assert_eq!(fs::read(&f.store_path).unwrap(), before);
}

// ---- Terminate ----

#[test]
fn terminate_revokes_then_wipes() {
    let f = fixture(MockDeviceState::default());
    let device = f.provider.state();
    let ca = MockCaClient::issuing(Vec::new());

    let mut store = EnrollmentStore::load(&f.store_path).unwrap();
    store.add(enrolled_record(123_456)).unwrap();
    store.save().unwrap();

    services::terminate(&f.detector, &f.provider, &ca, &mut store, 123_456).unwrap();

    assert!(store.is_empty());
    assert_eq!(ca.revocations().len(), 1);
    let device = device.lock().unwrap();
    assert!(device.management_key.is_factory_default());
    assert!(device.certificate_9a.is_none());
}

#[test]
fn terminate_never_wipes_when_revoke_fails() {
    let f = fixture(MockDeviceState::default());
    let device = f.provider.state();
    let mut ca = MockCaClient::issuing(Vec::new());
    ca.revoke_failure = Some("CA offline".to_string());

    let mut store = EnrollmentStore::load(&f.store_path).unwrap();
    store.add(enrolled_record(123_456)).unwrap();
    store.save().unwrap();

    let err =
        services::terminate(&f.detector, &f.provider, &ca, &mut store, 123_456).unwrap_err();
    assert!(matches!(err, EnrollmentError::Revocation(_)));

    // Record kept, device untouched: retry stays possible while the
    // certificate is still valid.
    assert!(store.get(123_456).is_some());
    let device = device.lock().unwrap();
    assert_eq!(device.pin_tries, 3);
    assert_eq!(device.puk_tries, 3);
}

#[test]
fn terminate_keeps_revocation_committed_when_reset_fails() {
    let mut state = MockDeviceState::default();
    state.fail_reset = true;
    let f = fixture(state);
    let ca = MockCaClient::issuing(Vec::new());

    let mut store = EnrollmentStore::load(&f.store_path).unwrap();
    store.add(enrolled_record(123_456)).unwrap();
    store.save().unwrap();

    let err =
        services::terminate(&f.detector, &f.provider, &ca, &mut store, 123_456).unwrap_err();

    // The reset failure surfaces, but the revocation is not rolled back:
    // the record is gone in memory and on disk.
    assert!(matches!(err, EnrollmentError::PartialReset(_)));
    assert!(store.is_empty());
    assert!(EnrollmentStore::load(&f.store_path).unwrap().is_empty());
    assert_eq!(ca.revocations().len(), 1);
}
