//! PC/SC transport backend over the `yubikey` crate.
//!
//! Requires pcscd on Linux; enabled with the `pcsc-backend` feature. Mode
//! switching is not exposed by the `yubikey` crate's PIV session, so the
//! mode operations report a transport error here; the mode state machine is
//! fully exercised through providers that do support it.

use der::Encode;
use yubikey::piv::{self, AlgorithmId, SlotId};
use yubikey::{Certificate, MgmKey, PinPolicy, TouchPolicy, YubiKey};

use crate::adapters::transport::{DeviceTransport, TransportProvider};
use crate::domain::{InterfaceMode, ManagementKey, PivPin, PivPuk};
use crate::infra::error::{EnrollmentError, EnrollmentResult};

// PIN value guaranteed wrong; used to burn down the retry counter.
const INVALID_PIN: &[u8] = b"\xff\xff\xff\xff\xff\xff";
const INVALID_PUK: &[u8] = b"\xff\xff\xff\xff\xff\xff\xff\xff";

/// Opens PC/SC sessions to the first available token.
pub struct PcscProvider;

impl TransportProvider for PcscProvider {
    fn open(&self) -> EnrollmentResult<Box<dyn DeviceTransport>> {
        let yubikey = YubiKey::open().map_err(|e| {
            EnrollmentError::DeviceUnavailable(format!("failed to open token: {e}"))
        })?;
        Ok(Box::new(PcscTransport { yubikey }))
    }
}

/// One PC/SC session.
pub struct PcscTransport {
    yubikey: YubiKey,
}

impl std::fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcscTransport").finish_non_exhaustive()
    }
}

impl PcscTransport {
    fn mgm_key(key: &ManagementKey) -> EnrollmentResult<MgmKey> {
        MgmKey::from_bytes(key.as_bytes()).map_err(|e| {
            EnrollmentError::Transport(format!("invalid management key material: {e}"))
        })
    }
}

impl DeviceTransport for PcscTransport {
    fn authenticate(&mut self, key: &ManagementKey) -> EnrollmentResult<bool> {
        match self.yubikey.authenticate(Self::mgm_key(key)?) {
            Ok(()) => Ok(true),
            Err(yubikey::Error::AuthenticationError) => Ok(false),
            Err(e) => Err(EnrollmentError::Transport(format!(
                "management key authentication failed: {e}"
            ))),
        }
    }

    fn set_management_key(&mut self, key: &ManagementKey) -> EnrollmentResult<()> {
        Self::mgm_key(key)?
            .set_manual(&mut self.yubikey, false)
            .map_err(|e| {
                EnrollmentError::Transport(format!("failed to set management key: {e}"))
            })
    }

    fn change_pin(&mut self, current: &PivPin, new: &PivPin) -> EnrollmentResult<()> {
        self.yubikey
            .change_pin(current.as_bytes(), new.as_bytes())
            .map_err(|e| EnrollmentError::Authentication(format!("PIN change failed: {e}")))
    }

    fn change_puk(&mut self, current: &PivPuk, new: &PivPuk) -> EnrollmentResult<()> {
        self.yubikey
            .change_puk(current.as_bytes(), new.as_bytes())
            .map_err(|e| EnrollmentError::Authentication(format!("PUK change failed: {e}")))
    }

    fn unblock_pin(&mut self, puk: &PivPuk, new_pin: &PivPin) -> EnrollmentResult<()> {
        self.yubikey
            .unblock_pin(puk.as_bytes(), new_pin.as_bytes())
            .map_err(|e| EnrollmentError::Authentication(format!("PIN unblock failed: {e}")))
    }

    fn mode(&mut self) -> EnrollmentResult<InterfaceMode> {
        Err(EnrollmentError::Transport(
            "interface mode read is not supported by the PC/SC backend".to_string(),
        ))
    }

    fn set_mode(&mut self, _mode: InterfaceMode) -> EnrollmentResult<()> {
        Err(EnrollmentError::Transport(
            "interface mode switching is not supported by the PC/SC backend".to_string(),
        ))
    }

    fn serial(&mut self) -> EnrollmentResult<u32> {
        Ok(self.yubikey.serial().into())
    }

    fn version(&mut self) -> EnrollmentResult<String> {
        let v = self.yubikey.version();
        Ok(format!("{}.{}.{}", v.major, v.minor, v.patch))
    }

    fn piv_version(&mut self) -> EnrollmentResult<String> {
        // PC/SC only reports the applet version; firmware and applet read
        // the same value here.
        self.version()
    }

    fn pin_tries_left(&mut self) -> EnrollmentResult<u8> {
        self.yubikey
            .get_pin_retries()
            .map_err(|e| EnrollmentError::Transport(format!("failed to read PIN retries: {e}")))
    }

    fn block_pin(&mut self) -> EnrollmentResult<()> {
        // Burn wrong attempts until the device reports the PIN locked.
        loop {
            match self.yubikey.verify_pin(INVALID_PIN) {
                Err(yubikey::Error::WrongPin { tries }) if tries > 0 => {}
                Err(yubikey::Error::WrongPin { .. }) | Err(yubikey::Error::PinLocked) => {
                    return Ok(())
                }
                Ok(()) => {
                    // Cannot happen with INVALID_PIN, but never loop forever.
                    return Err(EnrollmentError::Transport(
                        "device accepted the invalid PIN".to_string(),
                    ));
                }
                Err(e) => {
                    return Err(EnrollmentError::Transport(format!(
                        "PIN blocking failed: {e}"
                    )))
                }
            }
        }
    }

    fn block_puk(&mut self) -> EnrollmentResult<()> {
        loop {
            match self.yubikey.unblock_pin(INVALID_PUK, INVALID_PIN) {
                Err(yubikey::Error::WrongPin { tries }) if tries > 0 => {}
                Err(yubikey::Error::WrongPin { .. }) | Err(yubikey::Error::PinLocked) => {
                    return Ok(())
                }
                Ok(()) => {
                    return Err(EnrollmentError::Transport(
                        "device accepted the invalid PUK".to_string(),
                    ));
                }
                Err(e) => {
                    return Err(EnrollmentError::Transport(format!(
                        "PUK blocking failed: {e}"
                    )))
                }
            }
        }
    }

    fn reset_device(&mut self) -> EnrollmentResult<bool> {
        match self.yubikey.reset_device() {
            Ok(()) => Ok(true),
            Err(e) => {
                log::warn!("applet reset refused: {e}");
                Ok(false)
            }
        }
    }

    fn generate_key_9a(&mut self) -> EnrollmentResult<Vec<u8>> {
        let public_key = piv::generate(
            &mut self.yubikey,
            SlotId::Authentication,
            AlgorithmId::EccP256,
            PinPolicy::Once,
            TouchPolicy::Never,
        )
        .map_err(|e| EnrollmentError::Transport(format!("key generation failed: {e}")))?;

        public_key
            .to_der()
            .map_err(|e| EnrollmentError::Certificate(format!("failed to encode public key: {e}")))
    }

    fn import_certificate_9a(&mut self, der: &[u8]) -> EnrollmentResult<()> {
        let certificate = Certificate::from_bytes(der.to_vec())
            .map_err(|e| EnrollmentError::Certificate(format!("invalid certificate: {e}")))?;
        certificate
            .write(
                &mut self.yubikey,
                SlotId::Authentication,
                yubikey::certificate::CertInfo::Uncompressed,
            )
            .map_err(|e| EnrollmentError::Transport(format!("certificate import failed: {e}")))
    }

    fn certificate_9a(&mut self) -> EnrollmentResult<Option<Vec<u8>>> {
        match Certificate::read(&mut self.yubikey, SlotId::Authentication) {
            Ok(certificate) => {
                let der = certificate.cert.to_der().map_err(|e| {
                    EnrollmentError::Certificate(format!(
                        "failed to encode certificate to DER: {e}"
                    ))
                })?;
                Ok(Some(der))
            }
            Err(e) => {
                log::debug!("no certificate in slot 9a: {e}");
                Ok(None)
            }
        }
    }
}
