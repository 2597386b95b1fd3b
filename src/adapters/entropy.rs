//! Hardware entropy-source presence probe.
//!
//! Advisory only: the status readout shows whether the station's hardware
//! RNG is attached. No workflow depends on the answer.

use std::path::PathBuf;

/// Boolean presence query for the station's hardware RNG.
pub trait EntropySource: Send + Sync {
    fn is_present(&self) -> bool;
}

/// Probes a device node path (for example `/dev/hwrng`).
pub struct DeviceNodeEntropy {
    path: PathBuf,
}

impl DeviceNodeEntropy {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl EntropySource for DeviceNodeEntropy {
    fn is_present(&self) -> bool {
        self.path.exists()
    }
}

/// No hardware RNG configured.
pub struct NoEntropySource;

impl EntropySource for NoEntropySource {
    fn is_present(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_reflects_path_existence() {
        let dir = tempfile::tempdir().unwrap();
        let present = DeviceNodeEntropy::new(dir.path().to_path_buf());
        assert!(present.is_present());

        let absent = DeviceNodeEntropy::new(dir.path().join("missing"));
        assert!(!absent.is_present());

        assert!(!NoEntropySource.is_present());
    }
}
