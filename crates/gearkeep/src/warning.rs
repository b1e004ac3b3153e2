//! Warning tokens surfaced by the storage service.
//!
//! The service never fails across its public boundary. Every degraded path
//! resolves to a valid state plus one or more [`StorageWarning`]s. The UI shows
//! the first one and never blocks on it.

use crate::normalize::PayloadError;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageWarning {
    /// At least one durable store rejected a write. Which one is not exposed.
    StorageUnavailable,
    /// The primary store could not be read during load.
    PrimaryUnavailable,
    /// The loaded payload failed the structural check and was replaced.
    LoadValidationFailed(PayloadError),
    /// Import text was not JSON.
    ImportInvalid,
    /// Import JSON had the wrong top-level shape.
    ImportValidationFailed,
    /// Restore was requested but no backup exists on this device.
    NoDeviceBackup,
}

impl StorageWarning {
    /// Stable token for UI lookup and translation.
    pub fn token(&self) -> &'static str {
        match self {
            Self::StorageUnavailable => "storage-unavailable",
            Self::PrimaryUnavailable => "primary-unavailable",
            Self::LoadValidationFailed(_) => "load-validation-failed",
            Self::ImportInvalid => "import-invalid",
            Self::ImportValidationFailed => "import-validation-failed",
            Self::NoDeviceBackup => "no-device-backup",
        }
    }
}

impl fmt::Display for StorageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StorageUnavailable => {
                f.write_str("Some storage locations are unavailable; recent edits may not be durable")
            }
            Self::PrimaryUnavailable => f.write_str("Primary storage could not be read"),
            Self::LoadValidationFailed(err) => {
                write!(f, "Saved data was unreadable ({err}); starting fresh")
            }
            Self::ImportInvalid => f.write_str("Import file is not valid JSON"),
            Self::ImportValidationFailed => f.write_str("Import file has an unexpected structure"),
            Self::NoDeviceBackup => f.write_str("No backup found on this device"),
        }
    }
}
