//! Versioned on-disk envelope for persisted state.
//!
//! Stores are written as JSON `{version, data}`. Loading is fail-safe:
//! a missing file, unreadable JSON, or a version mismatch yields the
//! default (empty) data so the run proceeds with more work instead of
//! crashing.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to write store {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize store {path}: {source}")]
    Serialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    data: T,
}

/// Load a versioned store, falling back to `T::default()` on any
/// problem.
pub fn load<T: DeserializeOwned + Default>(path: &Path, version: u32) -> T {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            tracing::warn!("Discarding unreadable store {}: {}", path.display(), e);
            return T::default();
        }
    };

    let envelope: Envelope<T> = match serde_json::from_slice(&raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Discarding corrupt store {}: {}", path.display(), e);
            return T::default();
        }
    };

    if envelope.version != version {
        tracing::warn!(
            "Discarding store {} with version {} (expected {})",
            path.display(),
            envelope.version,
            version
        );
        return T::default();
    }

    envelope.data
}

/// Write a versioned store atomically (temp file + rename).
pub fn save<T: Serialize>(path: &Path, version: u32, data: &T) -> Result<(), StoreError> {
    let envelope = Envelope { version, data };
    let json = serde_json::to_vec(&envelope).map_err(|source| StoreError::Serialize {
        path: path.display().to_string(),
        source,
    })?;

    let write = |source| StoreError::Write {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &json).map_err(write)?;
    fs::rename(&tmp, path).map_err(write)?;
    Ok(())
}
