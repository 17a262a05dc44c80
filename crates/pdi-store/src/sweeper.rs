use crate::delete::{remove_file_best_effort, DeleteOutcome};
use crate::draft_store::{DiscardReport, DraftStore};
use crate::StoreError;
use pdi_model::DraftId;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

const ACTIVE_TTL_SECS: u64 = 259_200; // 3 days
const ARCHIVED_TTL_SECS: u64 = 15_552_000; // 180 days

#[derive(Debug, Clone, Copy)]
pub struct SweepConfig {
    /// How long a non-archived draft may sit untouched before it expires.
    pub active_ttl: Duration,
    /// How long an archived draft is retained after archival.
    pub archived_ttl: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            active_ttl: Duration::from_secs(ACTIVE_TTL_SECS),
            archived_ttl: Duration::from_secs(ARCHIVED_TTL_SECS),
        }
    }
}

/// Aggregate of one sweep pass. Warnings accumulate per file; a sweep never
/// aborts because a single deletion failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: u64,
    pub discarded_drafts: u64,
    pub deleted_images: u64,
    pub deleted_files: u64,
    pub warnings: Vec<String>,
}

impl SweepReport {
    fn absorb(&mut self, discard: DiscardReport) {
        self.deleted_images += discard.deleted_images;
        self.deleted_files += discard.deleted_files;
        self.warnings.extend(discard.warnings);
    }
}

/// Deletes drafts, images, and reports once they are no longer needed:
/// right after a successful render, right after a successful delivery, and
/// on a periodic age-based schedule.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    store: DraftStore,
    config: SweepConfig,
}

impl RetentionSweeper {
    #[must_use]
    pub fn new(store: DraftStore, config: SweepConfig) -> Self {
        Self { store, config }
    }

    /// Full discard of a draft whose report has been rendered. The PDF is
    /// not touched here; it belongs to the post-delivery sweep.
    pub fn sweep_after_submission(&self, id: &DraftId) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport {
            examined: 1,
            ..SweepReport::default()
        };
        let discard = self.store.discard(id)?;
        if discard.deleted_files > 0 || discard.deleted_images > 0 {
            report.discarded_drafts = 1;
        }
        report.absorb(discard);
        Ok(report)
    }

    /// Removes the rendered PDF once the notifier has confirmed delivery.
    /// Callers must not invoke this on delivery failure.
    #[must_use]
    pub fn sweep_after_delivery(&self, report_path: &str) -> SweepReport {
        let mut report = SweepReport {
            examined: 1,
            ..SweepReport::default()
        };
        match self.store.layout().resolve(report_path) {
            Ok(abs) => match remove_file_best_effort(&abs) {
                DeleteOutcome::Deleted => report.deleted_files += 1,
                DeleteOutcome::AlreadyAbsent => {}
                DeleteOutcome::Failed(msg) => report.warnings.push(msg),
            },
            Err(e) => report.warnings.push(format!("{report_path}: {e}")),
        }
        info!(
            path = report_path,
            deleted = report.deleted_files,
            "post-delivery sweep"
        );
        report
    }

    /// Discards every draft past its retention window: non-archived drafts
    /// idle longer than `active_ttl`, archived drafts older than
    /// `archived_ttl`. Safe to run repeatedly.
    pub fn sweep_aged(&self, now: i64) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();
        for path in self.store.list_draft_documents()? {
            report.examined += 1;
            let Some(id) = draft_id_of(&path) else {
                report
                    .warnings
                    .push(format!("unrecognized document name: {}", path.display()));
                continue;
            };
            match self.store.load(&id) {
                Ok(draft) => {
                    let ttl = if draft.archived {
                        self.config.archived_ttl
                    } else {
                        self.config.active_ttl
                    };
                    let age = now.saturating_sub(draft.retention_timestamp());
                    if age >= 0 && age as u64 >= ttl.as_secs() {
                        info!(draft_id = %id, age_secs = age, archived = draft.archived, "draft expired");
                        report.discarded_drafts += 1;
                        report.absorb(self.store.discard(&id)?);
                    }
                }
                // Deleted between listing and loading.
                Err(StoreError::NotFound) => {}
                Err(StoreError::InvalidDocument(msg)) => {
                    warn!(draft_id = %id, error = %msg, "skipping corrupt draft in age sweep");
                    report.warnings.push(format!("{id}: {msg}"));
                }
                Err(e) => report.warnings.push(format!("{id}: {e}")),
            }
        }
        Ok(report)
    }

    /// Deletes image files no draft references any more, provided they have
    /// been idle at least `active_ttl`. Skipped entirely when any draft
    /// document is unreadable, since its references cannot be known.
    pub fn sweep_orphans(&self) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();

        let mut referenced: BTreeSet<PathBuf> = BTreeSet::new();
        for path in self.store.list_draft_documents()? {
            let Some(id) = draft_id_of(&path) else {
                continue;
            };
            match self.store.load(&id) {
                Ok(draft) => {
                    for rel in draft.images.values() {
                        if let Ok(abs) = self.store.layout().resolve(rel) {
                            if let Some(thumb) = self.store.layout().thumb_sibling(&abs) {
                                referenced.insert(thumb);
                            }
                            referenced.insert(abs);
                        }
                    }
                }
                Err(StoreError::NotFound) => {}
                Err(e) => {
                    warn!(draft_id = %id, error = %e, "orphan sweep aborted: unreadable draft");
                    report.warnings.push(format!("{id}: {e}"));
                    return Ok(report);
                }
            }
        }

        let entries = fs::read_dir(self.store.layout().images_dir()).map_err(StoreError::io)?;
        for entry in entries {
            let entry = entry.map_err(StoreError::io)?;
            let path = entry.path();
            if !path.is_file() || referenced.contains(&path) {
                continue;
            }
            report.examined += 1;
            let idle = fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|m| m.elapsed().ok());
            if idle.is_some_and(|idle| idle >= self.config.active_ttl) {
                match remove_file_best_effort(&path) {
                    DeleteOutcome::Deleted => report.deleted_images += 1,
                    DeleteOutcome::AlreadyAbsent => {}
                    DeleteOutcome::Failed(msg) => report.warnings.push(msg),
                }
            }
        }
        if report.deleted_images > 0 {
            info!(deleted = report.deleted_images, "orphaned images removed");
        }
        Ok(report)
    }
}

fn draft_id_of(path: &std::path::Path) -> Option<DraftId> {
    let stem = path.file_stem()?.to_str()?;
    DraftId::parse(stem).ok()
}
