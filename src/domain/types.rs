//! Type-safe wrappers using the new-type pattern.
//!
//! Validated wrappers for PIN, PUK and management-key material so raw
//! strings and byte slices never flow through the workflow APIs. Secret
//! values redact themselves in `Display` and `Debug` output.

use std::fmt;
use std::str::FromStr;

use rand::{CryptoRng, Rng, RngCore};

use crate::domain::constants::{DEFAULT_MANAGEMENT_KEY, DEFAULT_PIN, DEFAULT_PUK};
use crate::infra::error::{EnrollmentError, EnrollmentResult};

fn validate_secret(kind: &str, value: &str, min: usize, max: usize) -> EnrollmentResult<()> {
    if value.len() < min {
        return Err(EnrollmentError::InvalidInput(format!(
            "{kind} too short: {} characters (minimum {min})",
            value.len()
        )));
    }
    if value.len() > max {
        return Err(EnrollmentError::InvalidInput(format!(
            "{kind} too long: {} characters (maximum {max})",
            value.len()
        )));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(EnrollmentError::InvalidInput(format!(
            "{kind} must contain only alphanumeric characters"
        )));
    }
    Ok(())
}

fn random_digits<R: RngCore + CryptoRng>(rng: &mut R, len: usize) -> String {
    (0..len).map(|_| char::from(b'0' + rng.gen_range(0..10))).collect()
}

/// PIV PIN (6-8 alphanumeric characters).
#[derive(Clone, PartialEq, Eq)]
pub struct PivPin(String);

impl PivPin {
    /// Create a new PIN after validation.
    pub fn new(pin: impl AsRef<str>) -> EnrollmentResult<Self> {
        let pin = pin.as_ref();
        validate_secret("PIV PIN", pin, 6, 8)?;
        Ok(PivPin(pin.to_string()))
    }

    /// The factory-default PIN.
    #[must_use]
    pub fn factory_default() -> Self {
        PivPin(DEFAULT_PIN.to_string())
    }

    /// Generate a fresh random 6-digit PIN.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        PivPin(random_digits(rng, 6))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl FromStr for PivPin {
    type Err = EnrollmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// Redacted to avoid accidental logging of PIN material.
impl fmt::Display for PivPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[PIN REDACTED]")
    }
}

impl fmt::Debug for PivPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PivPin([REDACTED])")
    }
}

/// PIV PUK (6-8 alphanumeric characters).
#[derive(Clone, PartialEq, Eq)]
pub struct PivPuk(String);

impl PivPuk {
    /// Create a new PUK after validation.
    pub fn new(puk: impl AsRef<str>) -> EnrollmentResult<Self> {
        let puk = puk.as_ref();
        validate_secret("PIV PUK", puk, 6, 8)?;
        Ok(PivPuk(puk.to_string()))
    }

    /// The factory-default PUK.
    #[must_use]
    pub fn factory_default() -> Self {
        PivPuk(DEFAULT_PUK.to_string())
    }

    /// Generate a fresh random 8-digit PUK.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        PivPuk(random_digits(rng, 8))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl FromStr for PivPuk {
    type Err = EnrollmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for PivPuk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[PUK REDACTED]")
    }
}

impl fmt::Debug for PivPuk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PivPuk([REDACTED])")
    }
}

/// PIV management key (24 bytes) gating privileged applet operations.
#[derive(Clone, PartialEq, Eq)]
pub struct ManagementKey([u8; 24]);

impl ManagementKey {
    #[must_use]
    pub fn new(bytes: [u8; 24]) -> Self {
        ManagementKey(bytes)
    }

    /// The well-known factory-default key. A device accepting it is
    /// unprovisioned.
    #[must_use]
    pub fn factory_default() -> Self {
        ManagementKey(DEFAULT_MANAGEMENT_KEY)
    }

    /// Generate a fresh random management key.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 24];
        rng.fill_bytes(&mut bytes);
        ManagementKey(bytes)
    }

    #[must_use]
    pub fn is_factory_default(&self) -> bool {
        self.0 == DEFAULT_MANAGEMENT_KEY
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 24] {
        &self.0
    }
}

impl fmt::Display for ManagementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[MANAGEMENT KEY REDACTED]")
    }
}

impl fmt::Debug for ManagementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ManagementKey([REDACTED])")
    }
}
