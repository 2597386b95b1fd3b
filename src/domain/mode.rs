//! Interface-mode state machine for the token's OTP, U2F and CCID interfaces.
//!
//! A token exposes any non-empty combination of the three logical interfaces,
//! optionally with an "eject card on touch" flag. The device encodes the
//! combination as a single mode byte; the flag is OR'd in as the high bit.
//! The all-disabled combination does not exist on the wire and is rejected
//! everywhere in this module.

use std::fmt;

use crate::infra::error::{EnrollmentError, EnrollmentResult};

/// High bit of the mode byte: eject the virtual smart card when the button
/// is touched.
pub const MODE_FLAG_EJECT: u8 = 0x80;

/// Which logical interfaces are active on the token, plus the eject flag.
///
/// Immutable value type; never stored, always re-read from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceMode {
    pub otp: bool,
    pub u2f: bool,
    pub ccid: bool,
    pub eject: bool,
}

impl InterfaceMode {
    const fn new(otp: bool, u2f: bool, ccid: bool, eject: bool) -> Self {
        Self {
            otp,
            u2f,
            ccid,
            eject,
        }
    }
}

/// Exhaustive table of the 14 legal modes and their wire encoding.
///
/// Low nibble values follow the device's mode enumeration; each combination
/// also exists with [`MODE_FLAG_EJECT`] set. There is deliberately no entry
/// for "nothing enabled" in either half.
const MODE_TABLE: [(u8, InterfaceMode, &str); 14] = [
    (0x00, InterfaceMode::new(true, false, false, false), "OTP"),
    (0x01, InterfaceMode::new(false, false, true, false), "CCID"),
    (0x02, InterfaceMode::new(true, false, true, false), "OTP+CCID"),
    (0x03, InterfaceMode::new(false, true, false, false), "U2F"),
    (0x04, InterfaceMode::new(true, true, false, false), "OTP+U2F"),
    (0x05, InterfaceMode::new(false, true, true, false), "U2F+CCID"),
    (0x06, InterfaceMode::new(true, true, true, false), "OTP+U2F+CCID"),
    (0x80, InterfaceMode::new(true, false, false, true), "OTP (eject)"),
    (0x81, InterfaceMode::new(false, false, true, true), "CCID (eject)"),
    (0x82, InterfaceMode::new(true, false, true, true), "OTP+CCID (eject)"),
    (0x83, InterfaceMode::new(false, true, false, true), "U2F (eject)"),
    (0x84, InterfaceMode::new(true, true, false, true), "OTP+U2F (eject)"),
    (0x85, InterfaceMode::new(false, true, true, true), "U2F+CCID (eject)"),
    (
        0x86,
        InterfaceMode::new(true, true, true, true),
        "OTP+U2F+CCID (eject)",
    ),
];

impl InterfaceMode {
    /// All legal modes, for exhaustive iteration in callers and tests.
    pub const ALL: [InterfaceMode; 14] = {
        let mut all = [MODE_TABLE[0].1; 14];
        let mut i = 0;
        while i < 14 {
            all[i] = MODE_TABLE[i].1;
            i += 1;
        }
        all
    };

    /// Decode a device mode byte.
    ///
    /// # Errors
    ///
    /// Returns [`EnrollmentError::InvalidMode`] for any byte outside the
    /// table. Unknown input is a hard error, never a fallback mode.
    pub fn from_mode_byte(byte: u8) -> EnrollmentResult<Self> {
        MODE_TABLE
            .iter()
            .find(|(b, _, _)| *b == byte)
            .map(|(_, mode, _)| *mode)
            .ok_or_else(|| {
                EnrollmentError::InvalidMode(format!("unrecognized mode byte 0x{byte:02x}"))
            })
    }

    /// Encode this mode as the device mode byte.
    ///
    /// # Errors
    ///
    /// Returns [`EnrollmentError::InvalidMode`] if no interface is enabled
    /// (unreachable for values decoded from the table, but hand-built values
    /// are rejected rather than coerced).
    pub fn mode_byte(self) -> EnrollmentResult<u8> {
        MODE_TABLE
            .iter()
            .find(|(_, mode, _)| *mode == self)
            .map(|(b, _, _)| *b)
            .ok_or_else(|| {
                EnrollmentError::InvalidMode("no interface enabled in mode value".to_string())
            })
    }

    /// Whether the smart-card (CCID) interface is active.
    ///
    /// PIV operations (PIN, PUK, certificate slot) are only reachable while
    /// CCID is active; this drives which workflows are offered.
    #[must_use]
    pub fn is_ccid_active(self) -> bool {
        self.ccid
    }

    /// Compute the mode after toggling the CCID interface.
    ///
    /// OTP, U2F and the eject flag are held fixed, with one pinned
    /// exception: disabling CCID on a CCID-only mode would leave no
    /// interface active, so it falls back to OTP-only (eject preserved),
    /// matching the device's legacy mode switch. A result with no interface
    /// enabled is rejected outright.
    ///
    /// # Errors
    ///
    /// Returns [`EnrollmentError::InvalidMode`] if `self` is not a legal
    /// mode value.
    pub fn toggled_ccid(self) -> EnrollmentResult<Self> {
        // Reject hand-built illegal inputs before computing anything.
        self.mode_byte()?;

        let mut next = Self {
            ccid: !self.ccid,
            ..self
        };
        if self.ccid && !next.otp && !next.u2f {
            // CCID-only: the empty combination is illegal, fall back to OTP.
            next.otp = true;
        }

        // The table lookup doubles as the zero-interface guard.
        next.mode_byte()?;
        Ok(next)
    }

    fn name(self) -> &'static str {
        MODE_TABLE
            .iter()
            .find(|(_, mode, _)| *mode == self)
            .map_or("<illegal mode>", |(_, _, name)| name)
    }
}

impl fmt::Display for InterfaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
