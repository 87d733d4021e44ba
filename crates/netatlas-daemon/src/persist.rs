//! State file persistence.
//!
//! The persisted layout is the store's [`PersistedState`] (the subnet
//! map and the last-successful-update timestamp) serialized as JSON.
//! The fingerprint and host certificate are deliberately absent: they
//! are derived from this state and re-registered on restore.
//!
//! Writes go to a sibling temp file first and are renamed into place, so
//! a crash mid-write never leaves a truncated state file.

use std::path::Path;

use netatlas_core::store::PersistedState;
use thiserror::Error;
use tracing::debug;

/// Persistence errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PersistError {
    /// Filesystem failure.
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The state file content is not a valid persisted state document.
    #[error("state file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Writes the state file atomically.
///
/// # Errors
///
/// Returns [`PersistError::Io`] on filesystem failure.
pub fn save_state(path: &Path, state: &PersistedState) -> Result<(), PersistError> {
    let json = serde_json::to_vec_pretty(state)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    debug!(path = %path.display(), subnets = state.subnets.len(), "state persisted");
    Ok(())
}

/// Loads the state file, if one exists.
///
/// # Errors
///
/// Returns [`PersistError::Io`] on filesystem failure other than a
/// missing file and [`PersistError::Corrupt`] on undecodable content.
pub fn load_state(path: &Path) -> Result<Option<PersistedState>, PersistError> {
    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.into()),
    };
    let state = serde_json::from_slice(&content)?;
    Ok(Some(state))
}

#[cfg(test)]
mod unit_tests {
    use std::collections::BTreeMap;

    use netatlas_core::topology::SubnetRecord;

    use super::*;

    fn sample_state() -> PersistedState {
        let mut subnets = BTreeMap::new();
        subnets.insert(
            "sn-1".to_string(),
            SubnetRecord::new("sn-1", "application", vec![]),
        );
        PersistedState {
            subnets,
            last_updated_ns: 1_700_000_000_000_000_000,
        }
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        save_state(&path, &sample_state()).unwrap();
        let loaded = load_state(&path).unwrap().unwrap();

        assert_eq!(loaded.last_updated_ns, 1_700_000_000_000_000_000);
        assert!(loaded.subnets.contains_key("sn-1"));
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_state(&dir.path().join("absent.json")).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{not json").unwrap();

        assert!(matches!(load_state(&path), Err(PersistError::Corrupt(_))));
    }

    #[test]
    fn test_save_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        save_state(&path, &sample_state()).unwrap();
        let mut updated = sample_state();
        updated.last_updated_ns = 42;
        save_state(&path, &updated).unwrap();

        let loaded = load_state(&path).unwrap().unwrap();
        assert_eq!(loaded.last_updated_ns, 42);
        assert!(!path.with_extension("tmp").exists(), "temp file is renamed away");
    }
}
