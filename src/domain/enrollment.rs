//! Enrollment record schema.
//!
//! One [`EnrolledDevice`] exists per physically enrolled token, keyed by the
//! device serial. Records are created by the enroll workflow, never mutated,
//! and destroyed by revoke or terminate; a removed record means the bound
//! certificate is revoked (or the device retired).

use chrono::{DateTime, Utc};
use der::Decode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x509_cert::Certificate;

use crate::infra::error::{EnrollmentError, EnrollmentResult};

/// Parsed details of the certificate bound to a device, kept alongside the
/// raw DER so the certificate can be exported or displayed without the
/// device present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateDetails {
    /// Certificate serial number, uppercase hex.
    pub serial: String,
    /// SHA-256 thumbprint of the DER encoding, uppercase hex.
    pub thumbprint: String,
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Raw DER bytes, base64 in the persisted snapshot.
    #[serde(with = "base64_bytes")]
    pub raw_der: Vec<u8>,
}

impl CertificateDetails {
    /// Parse a DER-encoded X.509 certificate into its stored details.
    ///
    /// # Errors
    ///
    /// Returns [`EnrollmentError::Certificate`] if the bytes are not a valid
    /// certificate.
    pub fn from_der(der: &[u8]) -> EnrollmentResult<Self> {
        let cert = Certificate::from_der(der)
            .map_err(|e| EnrollmentError::Certificate(format!("failed to parse DER: {e}")))?;

        let tbs = &cert.tbs_certificate;
        let not_before = DateTime::<Utc>::from(tbs.validity.not_before.to_system_time());
        let not_after = DateTime::<Utc>::from(tbs.validity.not_after.to_system_time());

        Ok(Self {
            serial: hex::encode_upper(tbs.serial_number.as_bytes()),
            thumbprint: hex::encode_upper(Sha256::digest(der)),
            subject: tbs.subject.to_string(),
            issuer: tbs.issuer.to_string(),
            not_before,
            not_after,
            raw_der: der.to_vec(),
        })
    }
}

/// Firmware identification captured at enrollment time, opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceVersions {
    pub firmware: String,
    pub piv_applet: String,
}

/// One enrolled token: the durable binding between a physical device and a
/// CA-issued certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrolledDevice {
    /// Device serial number; unique key within the store.
    pub device_serial: u32,
    /// Identity of the user the certificate was enrolled for.
    pub username: String,
    /// Enrollment timestamp, UTC.
    pub enrolled_at: DateTime<Utc>,
    /// Identifier of the CA that issued the bound certificate.
    pub ca: String,
    pub versions: DeviceVersions,
    pub certificate: CertificateDetails,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage_der() {
        let err = CertificateDetails::from_der(&[0xde, 0xad, 0xbe, 0xef]).unwrap_err();
        assert!(matches!(err, EnrollmentError::Certificate(_)));
    }

    #[test]
    fn record_serde_round_trip() {
        let record = EnrolledDevice {
            device_serial: 123456,
            username: "jdoe".to_string(),
            enrolled_at: Utc::now(),
            ca: "RootCA".to_string(),
            versions: DeviceVersions {
                firmware: "3.4.9".to_string(),
                piv_applet: "1.0.4".to_string(),
            },
            certificate: CertificateDetails {
                serial: "0A1B".to_string(),
                thumbprint: "AB".repeat(32),
                subject: "CN=jdoe".to_string(),
                issuer: "CN=RootCA".to_string(),
                not_before: Utc::now(),
                not_after: Utc::now(),
                raw_der: vec![0x30, 0x03, 0x02, 0x01, 0x01],
            },
        };

        let json = serde_json::to_string(&record).unwrap();
        // Raw DER must land as base64 text, not a byte array.
        assert!(json.contains("\"raw_der\":\"MAMCAQE=\""));

        let back: EnrolledDevice = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
