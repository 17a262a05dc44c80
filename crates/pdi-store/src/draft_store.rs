use crate::delete::{remove_file_best_effort, DeleteOutcome};
use crate::layout::StorageLayout;
use crate::StoreError;
use pdi_core::unix_seconds_now;
use pdi_model::{Draft, DraftId, FieldValue};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Locks left behind by a crashed process are taken over after this long.
const STALE_LOCK_AFTER: Duration = Duration::from_secs(60);

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);
const LOCK_POLL: Duration = Duration::from_millis(25);

/// Outcome of a completed discard. Always a success shape: partially failed
/// deletions land in `warnings` and are picked up by the next sweep instead
/// of failing the whole operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscardReport {
    pub deleted_images: u64,
    pub deleted_files: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub draft: Draft,
    pub replaced_previous: bool,
}

/// CRUD over per-draft JSON documents plus the image registry.
///
/// One document per draft under `drafts/`; every mutation rewrites the whole
/// document through a tmp-file + rename, guarded by a per-draft lock file
/// with a bounded acquire.
#[derive(Debug, Clone)]
pub struct DraftStore {
    layout: StorageLayout,
    lock_timeout: Duration,
}

struct DraftLockGuard {
    path: PathBuf,
}

impl Drop for DraftLockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

impl DraftStore {
    #[must_use]
    pub fn new(layout: StorageLayout) -> Self {
        Self {
            layout,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_lock_timeout(layout: StorageLayout, lock_timeout: Duration) -> Self {
        Self {
            layout,
            lock_timeout,
        }
    }

    #[must_use]
    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn create(&self, owner_id: &str, initial_step: u32) -> Result<Draft, StoreError> {
        let draft = Draft::new(DraftId::generate(), owner_id, initial_step, unix_seconds_now());
        self.write_document(&draft)?;
        info!(draft_id = %draft.draft_id, owner = owner_id, "draft created");
        Ok(draft)
    }

    pub fn load(&self, id: &DraftId) -> Result<Draft, StoreError> {
        let raw = match fs::read_to_string(self.layout.draft_path(id)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::NotFound),
            Err(e) => return Err(StoreError::io(e)),
        };
        serde_json::from_str(&raw).map_err(|e| StoreError::InvalidDocument(e.to_string()))
    }

    /// Merges `patch` into the draft's fields, bumps the version, and retains
    /// the previous document as a `v{n}` snapshot for forensic recovery.
    pub fn update(
        &self,
        id: &DraftId,
        patch: BTreeMap<String, FieldValue>,
        new_step: Option<u32>,
    ) -> Result<Draft, StoreError> {
        let _lock = self.acquire_lock(id)?;
        let mut draft = self.load(id)?;

        self.snapshot_current(id, draft.version);

        draft.merge_fields(patch);
        if let Some(step) = new_step {
            draft.current_step = step;
        }
        draft.version += 1;
        draft.updated_at = unix_seconds_now();
        self.write_document(&draft)?;
        Ok(draft)
    }

    pub fn archive(&self, id: &DraftId, submission_id: &str) -> Result<Draft, StoreError> {
        let _lock = self.acquire_lock(id)?;
        let mut draft = self.load(id)?;
        draft.archived = true;
        draft.archived_at = Some(unix_seconds_now());
        draft.submission_id = Some(submission_id.to_string());
        self.write_document(&draft)?;
        info!(draft_id = %id, submission_id, "draft archived");
        Ok(draft)
    }

    /// Records `stored_path` as the image for `field_name`, deleting any
    /// previously registered file (and its thumbnail) for the same field.
    /// Old-file deletion is best-effort: a failure is logged, not fatal.
    pub fn register_image(
        &self,
        id: &DraftId,
        field_name: &str,
        stored_path: &str,
    ) -> Result<RegisterOutcome, StoreError> {
        let _lock = self.acquire_lock(id)?;
        let mut draft = self.load(id)?;

        let mut replaced_previous = false;
        if let Some(old_rel) = draft.images.get(field_name) {
            if old_rel != stored_path {
                replaced_previous = self.delete_image_file(id, old_rel).deleted();
            }
        }

        draft
            .images
            .insert(field_name.to_string(), stored_path.to_string());
        draft.version += 1;
        draft.updated_at = unix_seconds_now();
        self.write_document(&draft)?;
        info!(
            draft_id = %id,
            field = field_name,
            path = stored_path,
            replaced = replaced_previous,
            "image registered"
        );
        Ok(RegisterOutcome {
            draft,
            replaced_previous,
        })
    }

    /// Deletes every file the draft owns: registered images with their
    /// thumbnails, version snapshots, and the document itself.
    ///
    /// Idempotent — discarding a nonexistent draft is a success with zero
    /// counts. Every deletion is attempted even when an earlier one fails.
    pub fn discard(&self, id: &DraftId) -> Result<DiscardReport, StoreError> {
        let mut report = DiscardReport::default();
        let doc_path = self.layout.draft_path(id);

        let raw = match fs::read_to_string(&doc_path) {
            Ok(raw) => Some(raw),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(StoreError::io(e)),
        };

        let Some(raw) = raw else {
            // Snapshots can outlive the document if a previous discard was
            // interrupted between the two deletion phases.
            self.delete_snapshots(id, &mut report);
            return Ok(report);
        };

        match serde_json::from_str::<Draft>(&raw) {
            Ok(draft) => {
                for (field, rel) in &draft.images {
                    match self.delete_registered_image(rel, &mut report) {
                        Ok(()) => {}
                        Err(msg) => {
                            report.warnings.push(format!("{field}: {msg}"));
                        }
                    }
                }
            }
            Err(e) => {
                warn!(draft_id = %id, error = %e, "discarding draft with unreadable registry");
                report.warnings.push(format!(
                    "image registry unreadable ({e}); files left for the orphan sweep"
                ));
            }
        }

        self.delete_snapshots(id, &mut report);
        let _ = fs::remove_file(self.layout.lock_path(id));

        match remove_file_best_effort(&doc_path) {
            DeleteOutcome::Deleted => report.deleted_files += 1,
            DeleteOutcome::AlreadyAbsent => {}
            DeleteOutcome::Failed(msg) => report.warnings.push(msg),
        }

        info!(
            draft_id = %id,
            images = report.deleted_images,
            files = report.deleted_files,
            warnings = report.warnings.len(),
            "draft discarded"
        );
        Ok(report)
    }

    /// Document-only delete backing the UI "X" action: removes the JSON and
    /// its snapshots but leaves stored images to the orphan sweep.
    pub fn delete_document(&self, id: &DraftId) -> Result<DiscardReport, StoreError> {
        let mut report = DiscardReport::default();
        self.delete_snapshots(id, &mut report);
        let _ = fs::remove_file(self.layout.lock_path(id));
        match remove_file_best_effort(&self.layout.draft_path(id)) {
            DeleteOutcome::Deleted => report.deleted_files += 1,
            DeleteOutcome::AlreadyAbsent => {}
            DeleteOutcome::Failed(msg) => report.warnings.push(msg),
        }
        Ok(report)
    }

    /// Paths of all primary draft documents (snapshots excluded).
    pub fn list_draft_documents(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut out = Vec::new();
        let entries = fs::read_dir(self.layout.drafts_dir()).map_err(StoreError::io)?;
        for entry in entries {
            let entry = entry.map_err(StoreError::io)?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".json") {
                continue;
            }
            // Snapshots look like `{id}.v{n}.json`; primaries have one dot.
            let stem = &name[..name.len() - ".json".len()];
            if stem.contains('.') {
                continue;
            }
            out.push(path);
        }
        out.sort();
        Ok(out)
    }

    fn delete_registered_image(
        &self,
        rel: &str,
        report: &mut DiscardReport,
    ) -> Result<(), String> {
        let abs = self
            .layout
            .resolve(rel)
            .map_err(|e| format!("unresolvable path {rel}: {e}"))?;
        match remove_file_best_effort(&abs) {
            DeleteOutcome::Deleted => report.deleted_images += 1,
            DeleteOutcome::AlreadyAbsent => {}
            DeleteOutcome::Failed(msg) => return Err(msg),
        }
        if let Some(thumb) = self.layout.thumb_sibling(&abs) {
            match remove_file_best_effort(&thumb) {
                DeleteOutcome::Deleted => report.deleted_files += 1,
                DeleteOutcome::AlreadyAbsent => {}
                DeleteOutcome::Failed(msg) => report.warnings.push(msg),
            }
        }
        Ok(())
    }

    fn delete_image_file(&self, id: &DraftId, rel: &str) -> DeleteOutcome {
        let abs = match self.layout.resolve(rel) {
            Ok(abs) => abs,
            Err(e) => {
                warn!(draft_id = %id, path = rel, error = %e, "old image path unresolvable");
                return DeleteOutcome::Failed(e.to_string());
            }
        };
        let outcome = remove_file_best_effort(&abs);
        if let DeleteOutcome::Failed(msg) = &outcome {
            warn!(draft_id = %id, error = %msg, "failed to delete replaced image");
        }
        if let Some(thumb) = self.layout.thumb_sibling(&abs) {
            if let DeleteOutcome::Failed(msg) = remove_file_best_effort(&thumb) {
                warn!(draft_id = %id, error = %msg, "failed to delete replaced thumbnail");
            }
        }
        outcome
    }

    fn delete_snapshots(&self, id: &DraftId, report: &mut DiscardReport) {
        let prefix = format!("{id}.v");
        let Ok(entries) = fs::read_dir(self.layout.drafts_dir()) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with(&prefix) && name.ends_with(".json") {
                match remove_file_best_effort(&path) {
                    DeleteOutcome::Deleted => report.deleted_files += 1,
                    DeleteOutcome::AlreadyAbsent => {}
                    DeleteOutcome::Failed(msg) => report.warnings.push(msg),
                }
            }
        }
    }

    fn snapshot_current(&self, id: &DraftId, version: u64) {
        let from = self.layout.draft_path(id);
        let to = self.layout.snapshot_path(id, version);
        if let Err(e) = fs::copy(&from, &to) {
            // Forensic only; the update itself must not fail on this.
            warn!(draft_id = %id, version, error = %e, "version snapshot failed");
        }
    }

    fn write_document(&self, draft: &Draft) -> Result<(), StoreError> {
        let path = self.layout.draft_path(&draft.draft_id);
        let bytes = serde_json::to_vec_pretty(draft)
            .map_err(|e| StoreError::InvalidDocument(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &bytes).map_err(StoreError::io)?;
        fs::rename(&tmp, &path).map_err(StoreError::io)?;
        Ok(())
    }

    fn acquire_lock(&self, id: &DraftId) -> Result<DraftLockGuard, StoreError> {
        let path = self.layout.lock_path(id);
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            match fs::OpenOptions::new().create_new(true).write(true).open(&path) {
                Ok(_) => return Ok(DraftLockGuard { path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let age = fs::metadata(&path)
                        .and_then(|m| m.modified())
                        .ok()
                        .and_then(|m| m.elapsed().ok());
                    if age.is_some_and(|age| age > STALE_LOCK_AFTER) {
                        warn!(draft_id = %id, "removing stale draft lock");
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(StoreError::Busy);
                    }
                    std::thread::sleep(LOCK_POLL);
                }
                Err(e) => return Err(StoreError::io(e)),
            }
        }
    }
}
