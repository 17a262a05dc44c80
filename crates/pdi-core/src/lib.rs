#![forbid(unsafe_code)]

use sha2::{Digest, Sha256};
use std::path::PathBuf;

pub const CRATE_NAME: &str = "pdi-core";

pub const ENV_PDI_LOG_LEVEL: &str = "PDI_LOG_LEVEL";
pub const ENV_PDI_STORAGE_ROOT: &str = "PDI_STORAGE_ROOT";

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Resolves the storage root for drafts, images, and reports.
///
/// Explicit `PDI_STORAGE_ROOT` wins; otherwise falls back to a workspace-local
/// `artifacts/storage` directory.
#[must_use]
pub fn resolve_storage_root() -> PathBuf {
    if let Ok(explicit) = std::env::var(ENV_PDI_STORAGE_ROOT) {
        let trimmed = explicit.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    PathBuf::from("artifacts").join("storage")
}

#[must_use]
pub fn unix_seconds_now() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}
