//! Content identity: detects when a file's bytes changed since last seen.

use crate::PhotometaError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Fingerprint of a file's current content: size plus modification time.
///
/// Cheap to compute (one stat call) and sufficient to detect edits made
/// through normal tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentIdentity {
    pub len: u64,
    pub mtime_unix: i64,
}

impl ContentIdentity {
    /// Read the current identity of a file from the filesystem.
    pub fn of(path: &Path) -> crate::Result<Self> {
        let meta = fs::metadata(path).map_err(|e| PhotometaError::unreadable(path, e))?;
        let mtime_unix = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(Self {
            len: meta.len(),
            mtime_unix,
        })
    }

    /// Short hex digest used to key cache artifacts by identity.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.len.to_le_bytes());
        hasher.update(self.mtime_unix.to_le_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }
}

/// Short stable digest of an absolute path, used to group cache artifacts.
pub fn path_digest(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}
