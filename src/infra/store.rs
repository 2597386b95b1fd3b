//! Durable enrollment store.
//!
//! An ordered collection of [`EnrolledDevice`] records persisted as a whole
//! JSON snapshot (`store.json` by default). There is no transaction log:
//! load on start, full rewrite on save. The orchestrating workflows own the
//! in-memory store exclusively between load and save; the presence poller
//! never touches it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::EnrolledDevice;
use crate::infra::error::{EnrollmentError, EnrollmentResult};

/// Default store file name.
pub const STORE_FILE: &str = "store.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreSnapshot {
    devices: Vec<EnrolledDevice>,
}

/// In-memory enrollment store bound to its snapshot file.
#[derive(Debug)]
pub struct EnrollmentStore {
    path: PathBuf,
    devices: Vec<EnrolledDevice>,
}

impl EnrollmentStore {
    /// Load the store from `path`. A missing file is an empty store, not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`EnrollmentError::Store`] if the file exists but cannot be
    /// read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> EnrollmentResult<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            log::debug!("no store at {}, starting empty", path.display());
            return Ok(Self {
                path,
                devices: Vec::new(),
            });
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            EnrollmentError::Store(format!("failed to read {}: {e}", path.display()))
        })?;

        let snapshot: StoreSnapshot = serde_json::from_str(&content).map_err(|e| {
            EnrollmentError::Store(format!("failed to parse {}: {e}", path.display()))
        })?;

        log::debug!(
            "loaded {} enrollment(s) from {}",
            snapshot.devices.len(),
            path.display()
        );

        Ok(Self {
            path,
            devices: snapshot.devices,
        })
    }

    /// Insert a record.
    ///
    /// # Errors
    ///
    /// Returns [`EnrollmentError::Store`] if a record with the same device
    /// serial already exists; at most one live enrollment per device.
    pub fn add(&mut self, record: EnrolledDevice) -> EnrollmentResult<()> {
        if self.get(record.device_serial).is_some() {
            return Err(EnrollmentError::Store(format!(
                "device {} is already enrolled",
                record.device_serial
            )));
        }
        self.devices.push(record);
        Ok(())
    }

    /// Remove the record for `device_serial`, returning it if present.
    pub fn remove(&mut self, device_serial: u32) -> Option<EnrolledDevice> {
        let index = self
            .devices
            .iter()
            .position(|d| d.device_serial == device_serial)?;
        Some(self.devices.remove(index))
    }

    #[must_use]
    pub fn get(&self, device_serial: u32) -> Option<&EnrolledDevice> {
        self.devices
            .iter()
            .find(|d| d.device_serial == device_serial)
    }

    #[must_use]
    pub fn devices(&self) -> &[EnrolledDevice] {
        &self.devices
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the whole snapshot.
    ///
    /// Writes to a temporary sibling file and renames it over the target so
    /// a crash mid-write never leaves a truncated store.
    pub fn save(&self) -> EnrollmentResult<()> {
        let snapshot = StoreSnapshot {
            devices: self.devices.clone(),
        };
        let content = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| EnrollmentError::Store(format!("failed to serialize store: {e}")))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    EnrollmentError::Store(format!("failed to create {}: {e}", parent.display()))
                })?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| {
            EnrollmentError::Store(format!("failed to write {}: {e}", tmp.display()))
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            EnrollmentError::Store(format!(
                "failed to replace {}: {e}",
                self.path.display()
            ))
        })?;

        log::info!(
            "saved {} enrollment(s) to {}",
            self.devices.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CertificateDetails, DeviceVersions};
    use chrono::Utc;

    fn sample(serial: u32) -> EnrolledDevice {
        EnrolledDevice {
            device_serial: serial,
            username: "jdoe".to_string(),
            enrolled_at: Utc::now(),
            ca: "RootCA".to_string(),
            versions: DeviceVersions {
                firmware: "3.4.9".to_string(),
                piv_applet: "1.0.4".to_string(),
            },
            certificate: CertificateDetails {
                serial: "0A1B".to_string(),
                thumbprint: "CD".repeat(32),
                subject: "CN=jdoe".to_string(),
                issuer: "CN=RootCA".to_string(),
                not_before: Utc::now(),
                not_after: Utc::now(),
                raw_der: vec![0x30, 0x00],
            },
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnrollmentStore::load(dir.path().join("store.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn duplicate_serial_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = EnrollmentStore::load(dir.path().join("store.json")).unwrap();
        store.add(sample(1)).unwrap();
        let err = store.add(sample(1)).unwrap_err();
        assert!(matches!(err, EnrollmentError::Store(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let mut store = EnrollmentStore::load(&path).unwrap();
        store.add(sample(7)).unwrap();
        store.save().unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }
}
