//! Certificate authority client.
//!
//! The station talks to the CA at exactly two seams: submit a public key
//! for certification during enrollment, and revoke one certificate during
//! revoke/terminate. Protocol internals stay behind [`CaClient`]; the
//! production implementation shells out to operator-configured commands
//! (`certutil` style) and passes their failure output through verbatim.

use std::io::Write;
use std::process::Command;
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::infra::error::{EnrollmentError, EnrollmentResult};
use crate::infra::settings::Settings;

/// Certificate authority operations used by the workflows.
pub trait CaClient: Send + Sync {
    /// Submit a DER `SubjectPublicKeyInfo` for certification; returns the
    /// issued certificate as DER.
    fn issue(&self, ca: &str, username: &str, public_key_der: &[u8]) -> EnrollmentResult<Vec<u8>>;

    /// Revoke one certificate by serial (uppercase hex).
    ///
    /// # Errors
    ///
    /// Returns [`EnrollmentError::Revocation`] carrying the CA's message
    /// verbatim. No retries; every retry is an explicit re-invocation.
    fn revoke(&self, ca: &str, certificate_serial: &str) -> EnrollmentResult<()>;
}

/// CA client running the command templates from [`Settings`].
pub struct CommandCaClient {
    issue_command: String,
    revoke_command: String,
}

impl CommandCaClient {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            issue_command: settings.issue_command.clone(),
            revoke_command: settings.revoke_command.clone(),
        }
    }

    fn run(template: &str, substitutions: &[(&str, &str)]) -> EnrollmentResult<Vec<u8>> {
        let mut rendered = template.to_string();
        for (placeholder, value) in substitutions {
            rendered = rendered.replace(placeholder, value);
        }

        let mut parts = rendered.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            EnrollmentError::Settings("empty CA command template".to_string())
        })?;

        log::info!("running CA command: {rendered}");
        let output = Command::new(program)
            .args(parts)
            .output()
            .map_err(|e| EnrollmentError::Io(format!("failed to run {program}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if stderr.is_empty() {
                format!("{program} exited with {}", output.status)
            } else {
                stderr
            };
            return Err(EnrollmentError::Io(detail));
        }

        Ok(output.stdout)
    }

    fn decode_certificate(output: &[u8]) -> EnrollmentResult<Vec<u8>> {
        // Accept PEM or raw DER from the issue command.
        let text = String::from_utf8_lossy(output);
        if let Some(start) = text.find("-----BEGIN CERTIFICATE-----") {
            let body = &text[start + "-----BEGIN CERTIFICATE-----".len()..];
            let end = body.find("-----END CERTIFICATE-----").ok_or_else(|| {
                EnrollmentError::Certificate("unterminated PEM certificate".to_string())
            })?;
            let b64: String = body[..end].chars().filter(|c| !c.is_whitespace()).collect();
            return BASE64.decode(b64.as_bytes()).map_err(|e| {
                EnrollmentError::Certificate(format!("invalid PEM base64: {e}"))
            });
        }
        Ok(output.to_vec())
    }
}

impl CaClient for CommandCaClient {
    fn issue(&self, ca: &str, username: &str, public_key_der: &[u8]) -> EnrollmentResult<Vec<u8>> {
        // The public key goes through a temp file so arbitrary CA tooling
        // can consume it; removed when the handle drops.
        let mut request = tempfile::NamedTempFile::new()?;
        request.write_all(public_key_der)?;
        let request_path = request.path().to_string_lossy().to_string();

        let output = Self::run(
            &self.issue_command,
            &[("{ca}", ca), ("{user}", username), ("{request}", &request_path)],
        )
        .map_err(|e| EnrollmentError::Certificate(format!("CA issuance failed: {e}")))?;

        Self::decode_certificate(&output)
    }

    fn revoke(&self, ca: &str, certificate_serial: &str) -> EnrollmentResult<()> {
        Self::run(
            &self.revoke_command,
            &[("{ca}", ca), ("{serial}", certificate_serial)],
        )
        .map(|_| ())
        .map_err(|e| EnrollmentError::Revocation(e.to_string()))
    }
}

/// Scripted CA client for tests.
pub struct MockCaClient {
    /// Certificate DER returned by `issue`.
    pub certificate_der: Vec<u8>,
    /// When set, `revoke` fails with this message (passed through verbatim).
    pub revoke_failure: Option<String>,
    /// When set, `issue` fails with this message.
    pub issue_failure: Option<String>,
    revocations: Mutex<Vec<(String, String)>>,
    issuances: Mutex<Vec<(String, String)>>,
}

impl MockCaClient {
    #[must_use]
    pub fn issuing(certificate_der: Vec<u8>) -> Self {
        Self {
            certificate_der,
            revoke_failure: None,
            issue_failure: None,
            revocations: Mutex::new(Vec::new()),
            issuances: Mutex::new(Vec::new()),
        }
    }

    /// `(ca, certificate_serial)` pairs revoked so far.
    #[must_use]
    pub fn revocations(&self) -> Vec<(String, String)> {
        self.revocations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// `(ca, username)` pairs issued so far.
    #[must_use]
    pub fn issuances(&self) -> Vec<(String, String)> {
        self.issuances
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl CaClient for MockCaClient {
    fn issue(&self, ca: &str, username: &str, _public_key_der: &[u8]) -> EnrollmentResult<Vec<u8>> {
        if let Some(message) = &self.issue_failure {
            return Err(EnrollmentError::Certificate(message.clone()));
        }
        self.issuances
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((ca.to_string(), username.to_string()));
        Ok(self.certificate_der.clone())
    }

    fn revoke(&self, ca: &str, certificate_serial: &str) -> EnrollmentResult<()> {
        if let Some(message) = &self.revoke_failure {
            return Err(EnrollmentError::Revocation(message.clone()));
        }
        self.revocations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((ca.to_string(), certificate_serial.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pem_output_is_decoded() {
        let pem = b"-----BEGIN CERTIFICATE-----\nMAMCAQE=\n-----END CERTIFICATE-----\n";
        let der = CommandCaClient::decode_certificate(pem).unwrap();
        assert_eq!(der, vec![0x30, 0x03, 0x02, 0x01, 0x01]);
    }

    #[test]
    fn der_output_passes_through() {
        let der = vec![0x30, 0x03, 0x02, 0x01, 0x01];
        assert_eq!(CommandCaClient::decode_certificate(&der).unwrap(), der);
    }

    #[test]
    fn mock_revoke_failure_is_verbatim() {
        let mut ca = MockCaClient::issuing(vec![]);
        ca.revoke_failure = Some("certificate not found in database".to_string());
        let err = ca.revoke("RootCA", "0A1B").unwrap_err();
        assert_eq!(
            err.to_string(),
            "revocation failed: certificate not found in database"
        );
        assert!(ca.revocations().is_empty());
    }
}
