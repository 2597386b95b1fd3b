//! In-memory mock device for tests and development.
//!
//! Simulates one physical token behind [`TransportProvider`]. The shared
//! [`MockDeviceState`] is the "physical" device: sessions opened through a
//! [`MockProvider`] all see it, tests inspect and mutate it directly, and
//! failure-injection flags let workflow tests exercise partial-failure
//! paths (refused reset, failing import, absent device).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::adapters::transport::{DeviceTransport, TransportProvider};
use crate::domain::{InterfaceMode, ManagementKey, PivPin, PivPuk};
use crate::infra::error::{EnrollmentError, EnrollmentResult};

/// Full simulated device state.
#[derive(Debug, Clone)]
pub struct MockDeviceState {
    /// Whether the token is physically inserted; `open` fails when false.
    pub present: bool,
    pub serial: u32,
    pub firmware: String,
    pub piv_applet: String,
    pub mode: InterfaceMode,
    pub management_key: ManagementKey,
    pub pin: PivPin,
    pub puk: PivPuk,
    pub pin_tries: u8,
    pub puk_tries: u8,
    /// DER `SubjectPublicKeyInfo` handed out by `generate_key_9a`.
    pub next_public_key: Vec<u8>,
    pub key_9a_present: bool,
    pub certificate_9a: Option<Vec<u8>>,

    // Failure injection
    pub fail_generate: bool,
    pub fail_import: bool,
    /// Device refuses the final applet reset (counters stay exhausted).
    pub fail_reset: bool,

    /// Number of sessions opened so far.
    pub opens: u32,
}

impl Default for MockDeviceState {
    fn default() -> Self {
        Self {
            present: true,
            serial: 123_456,
            firmware: "3.4.9".to_string(),
            piv_applet: "1.0.4".to_string(),
            mode: InterfaceMode {
                otp: true,
                u2f: false,
                ccid: true,
                eject: false,
            },
            management_key: ManagementKey::factory_default(),
            pin: PivPin::factory_default(),
            puk: PivPuk::factory_default(),
            pin_tries: 3,
            puk_tries: 3,
            next_public_key: vec![0x30, 0x00],
            key_9a_present: false,
            certificate_9a: None,
            fail_generate: false,
            fail_import: false,
            fail_reset: false,
            opens: 0,
        }
    }
}

impl MockDeviceState {
    /// A factory-fresh device with the given serial.
    #[must_use]
    pub fn virgin(serial: u32) -> Self {
        Self {
            serial,
            ..Self::default()
        }
    }

    fn wipe(&mut self) {
        self.management_key = ManagementKey::factory_default();
        self.pin = PivPin::factory_default();
        self.puk = PivPuk::factory_default();
        self.pin_tries = 3;
        self.puk_tries = 3;
        self.key_9a_present = false;
        self.certificate_9a = None;
    }
}

/// Shared handle to the simulated device.
pub type SharedMockState = Arc<Mutex<MockDeviceState>>;

/// Opens [`MockTransport`] sessions over a shared [`MockDeviceState`].
pub struct MockProvider {
    state: SharedMockState,
}

impl MockProvider {
    #[must_use]
    pub fn new(state: MockDeviceState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Handle for inspecting or mutating the device state from tests.
    #[must_use]
    pub fn state(&self) -> SharedMockState {
        Arc::clone(&self.state)
    }
}

impl TransportProvider for MockProvider {
    fn open(&self) -> EnrollmentResult<Box<dyn DeviceTransport>> {
        let mut state = lock(&self.state);
        if !state.present {
            return Err(EnrollmentError::DeviceUnavailable(
                "no token inserted".to_string(),
            ));
        }
        state.opens += 1;
        drop(state);
        Ok(Box::new(MockTransport {
            state: Arc::clone(&self.state),
            authenticated: false,
        }))
    }
}

fn lock(state: &SharedMockState) -> MutexGuard<'_, MockDeviceState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One simulated session.
#[derive(Debug)]
pub struct MockTransport {
    state: SharedMockState,
    authenticated: bool,
}

impl MockTransport {
    fn require_auth(&self) -> EnrollmentResult<()> {
        if self.authenticated {
            Ok(())
        } else {
            Err(EnrollmentError::Authentication(
                "management key not verified in this session".to_string(),
            ))
        }
    }
}

impl DeviceTransport for MockTransport {
    fn authenticate(&mut self, key: &ManagementKey) -> EnrollmentResult<bool> {
        let state = lock(&self.state);
        let ok = *key == state.management_key;
        drop(state);
        if ok {
            self.authenticated = true;
        }
        Ok(ok)
    }

    fn set_management_key(&mut self, key: &ManagementKey) -> EnrollmentResult<()> {
        self.require_auth()?;
        lock(&self.state).management_key = key.clone();
        Ok(())
    }

    fn change_pin(&mut self, current: &PivPin, new: &PivPin) -> EnrollmentResult<()> {
        let mut state = lock(&self.state);
        if state.pin_tries == 0 {
            return Err(EnrollmentError::Authentication("PIN is blocked".to_string()));
        }
        if *current != state.pin {
            state.pin_tries -= 1;
            return Err(EnrollmentError::Authentication(
                "current PIN rejected".to_string(),
            ));
        }
        state.pin = new.clone();
        state.pin_tries = 3;
        Ok(())
    }

    fn change_puk(&mut self, current: &PivPuk, new: &PivPuk) -> EnrollmentResult<()> {
        let mut state = lock(&self.state);
        if state.puk_tries == 0 {
            return Err(EnrollmentError::Authentication("PUK is blocked".to_string()));
        }
        if *current != state.puk {
            state.puk_tries -= 1;
            return Err(EnrollmentError::Authentication(
                "current PUK rejected".to_string(),
            ));
        }
        state.puk = new.clone();
        state.puk_tries = 3;
        Ok(())
    }

    fn unblock_pin(&mut self, puk: &PivPuk, new_pin: &PivPin) -> EnrollmentResult<()> {
        let mut state = lock(&self.state);
        if state.puk_tries == 0 {
            return Err(EnrollmentError::Authentication("PUK is blocked".to_string()));
        }
        if *puk != state.puk {
            state.puk_tries -= 1;
            return Err(EnrollmentError::Authentication("PUK rejected".to_string()));
        }
        state.pin = new_pin.clone();
        state.pin_tries = 3;
        Ok(())
    }

    fn mode(&mut self) -> EnrollmentResult<InterfaceMode> {
        Ok(lock(&self.state).mode)
    }

    fn set_mode(&mut self, mode: InterfaceMode) -> EnrollmentResult<()> {
        // Encode first so an illegal value is rejected like hardware would.
        mode.mode_byte()?;
        lock(&self.state).mode = mode;
        Ok(())
    }

    fn serial(&mut self) -> EnrollmentResult<u32> {
        Ok(lock(&self.state).serial)
    }

    fn version(&mut self) -> EnrollmentResult<String> {
        Ok(lock(&self.state).firmware.clone())
    }

    fn piv_version(&mut self) -> EnrollmentResult<String> {
        Ok(lock(&self.state).piv_applet.clone())
    }

    fn pin_tries_left(&mut self) -> EnrollmentResult<u8> {
        Ok(lock(&self.state).pin_tries)
    }

    fn block_pin(&mut self) -> EnrollmentResult<()> {
        lock(&self.state).pin_tries = 0;
        Ok(())
    }

    fn block_puk(&mut self) -> EnrollmentResult<()> {
        lock(&self.state).puk_tries = 0;
        Ok(())
    }

    fn reset_device(&mut self) -> EnrollmentResult<bool> {
        let mut state = lock(&self.state);
        if state.fail_reset {
            return Ok(false);
        }
        if state.pin_tries > 0 || state.puk_tries > 0 {
            // The applet only resets once both counters are exhausted.
            return Ok(false);
        }
        state.wipe();
        Ok(true)
    }

    fn generate_key_9a(&mut self) -> EnrollmentResult<Vec<u8>> {
        self.require_auth()?;
        let mut state = lock(&self.state);
        if state.fail_generate {
            return Err(EnrollmentError::Transport(
                "key generation failed".to_string(),
            ));
        }
        state.key_9a_present = true;
        Ok(state.next_public_key.clone())
    }

    fn import_certificate_9a(&mut self, der: &[u8]) -> EnrollmentResult<()> {
        self.require_auth()?;
        let mut state = lock(&self.state);
        if state.fail_import {
            return Err(EnrollmentError::Transport(
                "certificate import failed".to_string(),
            ));
        }
        state.certificate_9a = Some(der.to_vec());
        Ok(())
    }

    fn certificate_9a(&mut self) -> EnrollmentResult<Option<Vec<u8>>> {
        Ok(lock(&self.state).certificate_9a.clone())
    }
}
