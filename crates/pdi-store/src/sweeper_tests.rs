use crate::{DraftStore, RetentionSweeper, StorageLayout, StoreError, SweepConfig};
use pdi_core::unix_seconds_now;
use pdi_model::DraftId;
use std::fs;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

fn sweeper(config: SweepConfig) -> (TempDir, DraftStore, RetentionSweeper) {
    let tmp = tempdir().expect("tempdir");
    let layout = StorageLayout::new(tmp.path().to_path_buf()).expect("layout");
    let store = DraftStore::new(layout);
    let sweeper = RetentionSweeper::new(store.clone(), config);
    (tmp, store, sweeper)
}

fn zero_ttl() -> SweepConfig {
    SweepConfig {
        active_ttl: Duration::ZERO,
        archived_ttl: Duration::ZERO,
    }
}

#[test]
fn age_sweep_with_zero_threshold_discards_fresh_draft() {
    let (_tmp, store, sweeper) = sweeper(zero_ttl());
    let draft = store.create("guest", 1).expect("create");

    let report = sweeper.sweep_aged(unix_seconds_now()).expect("sweep");
    assert_eq!(report.examined, 1);
    assert_eq!(report.discarded_drafts, 1);
    assert_eq!(store.load(&draft.draft_id), Err(StoreError::NotFound));

    // Same sweep again: nothing left, no error.
    let again = sweeper.sweep_aged(unix_seconds_now()).expect("sweep again");
    assert_eq!(again.examined, 0);
    assert_eq!(again.discarded_drafts, 0);
}

#[test]
fn age_sweep_keeps_fresh_drafts_under_default_ttl() {
    let (_tmp, store, sweeper) = sweeper(SweepConfig::default());
    let draft = store.create("guest", 1).expect("create");

    let report = sweeper.sweep_aged(unix_seconds_now()).expect("sweep");
    assert_eq!(report.discarded_drafts, 0);
    assert!(store.load(&draft.draft_id).is_ok());
}

#[test]
fn age_sweep_applies_long_ttl_to_archived_drafts() {
    let config = SweepConfig {
        active_ttl: Duration::ZERO,
        archived_ttl: Duration::from_secs(1_000),
    };
    let (_tmp, store, sweeper) = sweeper(config);
    let draft = store.create("guest", 1).expect("create");
    store.archive(&draft.draft_id, "SUB-1").expect("archive");

    // Archived recently: the zero active TTL must not apply.
    let now = unix_seconds_now();
    let report = sweeper.sweep_aged(now).expect("sweep");
    assert_eq!(report.discarded_drafts, 0);

    // Pretend the archive happened beyond the long window.
    let expired = sweeper.sweep_aged(now + 2_000).expect("sweep");
    assert_eq!(expired.discarded_drafts, 1);
    assert_eq!(store.load(&draft.draft_id), Err(StoreError::NotFound));
}

#[test]
fn age_sweep_skips_corrupt_documents_with_warning() {
    let (_tmp, store, sweeper) = sweeper(zero_ttl());
    let id = DraftId::parse("draft_corrupt").expect("id");
    fs::write(store.layout().draft_path(&id), b"nope").expect("write");

    let report = sweeper.sweep_aged(unix_seconds_now()).expect("sweep");
    assert_eq!(report.discarded_drafts, 0);
    assert_eq!(report.warnings.len(), 1);
    assert!(store.layout().draft_path(&id).exists());
}

#[test]
fn post_submission_sweep_is_idempotent() {
    let (_tmp, store, sweeper) = sweeper(SweepConfig::default());
    let draft = store.create("guest", 1).expect("create");
    let id = draft.draft_id.clone();
    let image = store.layout().images_dir().join("a.jpg");
    fs::write(&image, b"a").expect("write");
    store
        .register_image(&id, "front_view", "images/a.jpg")
        .expect("register");

    let first = sweeper.sweep_after_submission(&id).expect("sweep");
    assert_eq!(first.discarded_drafts, 1);
    assert_eq!(first.deleted_images, 1);
    assert!(!image.exists());

    let second = sweeper.sweep_after_submission(&id).expect("sweep again");
    assert_eq!(second.discarded_drafts, 0);
    assert_eq!(second.deleted_images, 0);
    assert_eq!(second.deleted_files, 0);
}

#[test]
fn post_delivery_sweep_deletes_the_report() {
    let (_tmp, store, sweeper) = sweeper(SweepConfig::default());
    let pdf = store.layout().reports_dir().join("inspection_bk1_1_aa.pdf");
    fs::write(&pdf, b"%PDF-1.4").expect("write");

    let report = sweeper.sweep_after_delivery("reports/inspection_bk1_1_aa.pdf");
    assert_eq!(report.deleted_files, 1);
    assert!(report.warnings.is_empty());
    assert!(!pdf.exists());

    // Already gone: benign.
    let again = sweeper.sweep_after_delivery("reports/inspection_bk1_1_aa.pdf");
    assert_eq!(again.deleted_files, 0);
    assert!(again.warnings.is_empty());
}

#[test]
fn post_delivery_sweep_rejects_non_canonical_paths() {
    let (_tmp, _store, sweeper) = sweeper(SweepConfig::default());
    let report = sweeper.sweep_after_delivery("../outside.pdf");
    assert_eq!(report.deleted_files, 0);
    assert_eq!(report.warnings.len(), 1);
}

#[test]
fn orphan_sweep_removes_unreferenced_images_only() {
    let (_tmp, store, sweeper) = sweeper(zero_ttl());
    let draft = store.create("guest", 1).expect("create");
    let images = store.layout().images_dir();
    fs::write(images.join("owned.jpg"), b"o").expect("write");
    fs::write(images.join("thumb_owned.jpg"), b"ot").expect("write");
    fs::write(images.join("stray.jpg"), b"s").expect("write");
    store
        .register_image(&draft.draft_id, "front_view", "images/owned.jpg")
        .expect("register");

    let report = sweeper.sweep_orphans().expect("sweep");
    assert_eq!(report.deleted_images, 1);
    assert!(images.join("owned.jpg").exists());
    assert!(images.join("thumb_owned.jpg").exists());
    assert!(!images.join("stray.jpg").exists());
}

#[test]
fn orphan_sweep_backs_off_when_a_registry_is_unreadable() {
    let (_tmp, store, sweeper) = sweeper(zero_ttl());
    let id = DraftId::parse("draft_corrupt").expect("id");
    fs::write(store.layout().draft_path(&id), b"{{").expect("write");
    let stray = store.layout().images_dir().join("stray.jpg");
    fs::write(&stray, b"s").expect("write");

    let report = sweeper.sweep_orphans().expect("sweep");
    assert_eq!(report.deleted_images, 0);
    assert!(!report.warnings.is_empty());
    assert!(stray.exists());
}
