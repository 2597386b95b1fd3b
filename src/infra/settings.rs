//! Station settings persistence.
//!
//! Settings live in a JSON file next to the store (`settings.json` by
//! default). Only the accessor contract matters to the workflows: the CA
//! identifier and the external command templates used at the CA seam.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::infra::error::{EnrollmentError, EnrollmentResult};

/// Default settings file name.
pub const SETTINGS_FILE: &str = "settings.json";

/// Station configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Identifier of the CA certificates are enrolled against, as understood
    /// by the CA commands (for example `host\\Example Root CA`).
    pub ca_name: String,

    /// Command template submitting a public key for certification. Receives
    /// `{ca}`, `{user}` and `{request}` (path to the DER public key); must
    /// print the issued certificate to stdout (DER or PEM).
    pub issue_command: String,

    /// Command template revoking a certificate. Receives `{ca}` and
    /// `{serial}` (certificate serial, uppercase hex).
    pub revoke_command: String,

    /// Device node probed for the hardware RNG status readout.
    pub entropy_device: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ca_name: String::new(),
            issue_command: "ca-issue --ca {ca} --user {user} --request {request}".to_string(),
            revoke_command: "ca-revoke --ca {ca} --serial {serial}".to_string(),
            entropy_device: None,
        }
    }
}

/// Loads and saves the settings file.
pub struct SettingsManager {
    path: PathBuf,
}

impl SettingsManager {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load settings from file.
    ///
    /// # Errors
    ///
    /// Returns [`EnrollmentError::Settings`] if the file is missing or
    /// malformed. A missing settings file is an operator setup problem, not
    /// an empty default.
    pub fn load(&self) -> EnrollmentResult<Settings> {
        log::debug!("loading settings from {}", self.path.display());

        let content = fs::read_to_string(&self.path).map_err(|e| {
            EnrollmentError::Settings(format!(
                "failed to read {}: {e} (run `settings init` first)",
                self.path.display()
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            EnrollmentError::Settings(format!("failed to parse {}: {e}", self.path.display()))
        })
    }

    /// Save settings to file.
    pub fn save(&self, settings: &Settings) -> EnrollmentResult<()> {
        log::info!("saving settings to {}", self.path.display());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    EnrollmentError::Settings(format!(
                        "failed to create {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| EnrollmentError::Settings(format!("failed to serialize settings: {e}")))?;

        fs::write(&self.path, content).map_err(|e| {
            EnrollmentError::Settings(format!("failed to write {}: {e}", self.path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SettingsManager::new(dir.path().join("settings.json"));
        assert!(!manager.exists());
        let err = manager.load().unwrap_err();
        assert!(matches!(err, EnrollmentError::Settings(_)));
    }

    #[test]
    fn settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SettingsManager::new(dir.path().join("settings.json"));

        let mut settings = Settings::default();
        settings.ca_name = "RootCA".to_string();
        settings.entropy_device = Some(PathBuf::from("/dev/hwrng"));
        manager.save(&settings).unwrap();

        let loaded = manager.load().unwrap();
        assert_eq!(loaded.ca_name, "RootCA");
        assert_eq!(loaded.entropy_device, Some(PathBuf::from("/dev/hwrng")));
    }
}
