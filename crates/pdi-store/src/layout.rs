use crate::StoreError;
use pdi_model::{is_storage_relative, DraftId};
use std::fs;
use std::path::{Path, PathBuf};

pub const DRAFTS_DIR: &str = "drafts";
pub const IMAGES_DIR: &str = "images";
pub const REPORTS_DIR: &str = "reports";
pub const THUMB_PREFIX: &str = "thumb_";

const WRITE_PROBE: &str = ".write-probe";

/// Single source of truth for where files live under the storage root.
///
/// Construction creates the three stores with mkdir-p semantics and probes
/// writability up front, so a misconfigured root fails at startup rather
/// than on the first write that happens to need it.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: PathBuf) -> Result<Self, StoreError> {
        for dir in [DRAFTS_DIR, IMAGES_DIR, REPORTS_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path).map_err(|e| {
                StoreError::Io(format!("cannot create {dir} directory: {e}"))
            })?;
            let probe = path.join(WRITE_PROBE);
            fs::write(&probe, b"probe")
                .map_err(|e| StoreError::Io(format!("{dir} directory not writable: {e}")))?;
            let _ = fs::remove_file(&probe);
        }
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn drafts_dir(&self) -> PathBuf {
        self.root.join(DRAFTS_DIR)
    }

    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    #[must_use]
    pub fn reports_dir(&self) -> PathBuf {
        self.root.join(REPORTS_DIR)
    }

    #[must_use]
    pub fn draft_path(&self, id: &DraftId) -> PathBuf {
        self.drafts_dir().join(format!("{id}.json"))
    }

    #[must_use]
    pub fn snapshot_path(&self, id: &DraftId, version: u64) -> PathBuf {
        self.drafts_dir().join(format!("{id}.v{version}.json"))
    }

    #[must_use]
    pub fn lock_path(&self, id: &DraftId) -> PathBuf {
        self.drafts_dir().join(format!("{id}.lock"))
    }

    /// Maps a canonical storage-relative path to its absolute location.
    ///
    /// Rejects anything that is not in the canonical format, which is what
    /// keeps registry entries from ever pointing outside the root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, StoreError> {
        if !is_storage_relative(relative) {
            return Err(StoreError::Io(format!(
                "not a canonical storage-relative path: {relative}"
            )));
        }
        Ok(self.root.join(relative))
    }

    /// Inverse of [`resolve`](Self::resolve) for paths under the root.
    pub fn to_storage_relative(&self, absolute: &Path) -> Result<String, StoreError> {
        let stripped = absolute.strip_prefix(&self.root).map_err(|_| {
            StoreError::Io(format!(
                "path is outside the storage root: {}",
                absolute.display()
            ))
        })?;
        let mut parts = Vec::new();
        for comp in stripped.components() {
            match comp {
                std::path::Component::Normal(seg) => {
                    parts.push(seg.to_string_lossy().into_owned());
                }
                _ => {
                    return Err(StoreError::Io(format!(
                        "non-canonical path component in {}",
                        absolute.display()
                    )))
                }
            }
        }
        Ok(parts.join("/"))
    }

    /// Sibling thumbnail location for a stored image.
    #[must_use]
    pub fn thumb_sibling(&self, image_abs: &Path) -> Option<PathBuf> {
        let name = image_abs.file_name()?.to_string_lossy();
        Some(image_abs.with_file_name(format!("{THUMB_PREFIX}{name}")))
    }
}
