use crate::{DraftStore, StorageLayout, StoreError};
use pdi_model::{DraftId, FieldValue};
use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

fn store() -> (TempDir, DraftStore) {
    let tmp = tempdir().expect("tempdir");
    let layout = StorageLayout::new(tmp.path().to_path_buf()).expect("layout");
    (tmp, DraftStore::new(layout))
}

fn patch(key: &str, value: &str) -> BTreeMap<String, FieldValue> {
    BTreeMap::from([(key.to_string(), FieldValue::from(value))])
}

#[test]
fn create_then_load_round_trips() {
    let (_tmp, store) = store();
    let created = store.create("inspector-7", 2).expect("create");
    let loaded = store.load(&created.draft_id).expect("load");
    assert_eq!(loaded, created);
    assert_eq!(loaded.version, 1);
    assert_eq!(loaded.owner_id, "inspector-7");
    assert_eq!(loaded.current_step, 2);
}

#[test]
fn load_missing_draft_is_not_found() {
    let (_tmp, store) = store();
    let id = DraftId::parse("draft_missing").expect("id");
    assert_eq!(store.load(&id), Err(StoreError::NotFound));
}

#[test]
fn load_corrupt_document_is_invalid_not_a_panic() {
    let (_tmp, store) = store();
    let id = DraftId::parse("draft_corrupt").expect("id");
    fs::write(store.layout().draft_path(&id), b"{not json").expect("write");
    assert!(matches!(
        store.load(&id),
        Err(StoreError::InvalidDocument(_))
    ));
}

#[test]
fn update_merges_bumps_version_and_snapshots() {
    let (_tmp, store) = store();
    let draft = store.create("guest", 1).expect("create");
    let id = draft.draft_id.clone();

    let after = store
        .update(&id, patch("booking_id", "BK-100"), Some(3))
        .expect("update");
    assert_eq!(after.version, 2);
    assert_eq!(after.current_step, 3);
    assert_eq!(after.fields["booking_id"], FieldValue::from("BK-100"));

    // The pre-update document is retained as a v1 snapshot.
    let snapshot = store.layout().snapshot_path(&id, 1);
    assert!(snapshot.is_file());
    let old: pdi_model::Draft =
        serde_json::from_str(&fs::read_to_string(&snapshot).expect("read")).expect("parse");
    assert_eq!(old.version, 1);
    assert!(old.fields.is_empty());
}

#[test]
fn update_missing_draft_is_not_found() {
    let (_tmp, store) = store();
    let id = DraftId::parse("draft_gone").expect("id");
    assert_eq!(
        store.update(&id, patch("k", "v"), None),
        Err(StoreError::NotFound)
    );
}

#[test]
fn update_against_held_lock_reports_busy() {
    let tmp = tempdir().expect("tempdir");
    let layout = StorageLayout::new(tmp.path().to_path_buf()).expect("layout");
    let store = DraftStore::with_lock_timeout(layout, Duration::from_millis(80));
    let draft = store.create("guest", 1).expect("create");

    fs::write(store.layout().lock_path(&draft.draft_id), b"").expect("hold lock");
    assert_eq!(
        store.update(&draft.draft_id, patch("k", "v"), None),
        Err(StoreError::Busy)
    );
}

#[test]
fn parallel_updates_all_land() {
    let (_tmp, store) = store();
    let draft = store.create("guest", 1).expect("create");
    let id = draft.draft_id.clone();

    let n = 8;
    std::thread::scope(|scope| {
        for i in 0..n {
            let store = store.clone();
            let id = id.clone();
            scope.spawn(move || {
                store
                    .update(&id, patch(&format!("field_{i}"), "x"), None)
                    .expect("concurrent update");
            });
        }
    });

    let final_draft = store.load(&id).expect("load");
    assert_eq!(final_draft.version, 1 + n);
    assert_eq!(final_draft.fields.len(), n as usize);
}

#[test]
fn archive_marks_and_records_submission() {
    let (_tmp, store) = store();
    let draft = store.create("guest", 1).expect("create");
    let archived = store.archive(&draft.draft_id, "SUB-42").expect("archive");
    assert!(archived.archived);
    assert!(archived.archived_at.is_some());
    assert_eq!(archived.submission_id.as_deref(), Some("SUB-42"));

    let reloaded = store.load(&draft.draft_id).expect("load");
    assert!(reloaded.archived);
}

#[test]
fn register_image_replaces_and_deletes_old_file() {
    let (_tmp, store) = store();
    let draft = store.create("guest", 1).expect("create");
    let id = draft.draft_id.clone();
    let images = store.layout().images_dir();

    fs::write(images.join("front_1.jpg"), b"old").expect("write old");
    fs::write(images.join("thumb_front_1.jpg"), b"old-thumb").expect("write old thumb");
    fs::write(images.join("front_2.jpg"), b"new").expect("write new");

    let first = store
        .register_image(&id, "front_view", "images/front_1.jpg")
        .expect("first register");
    assert!(!first.replaced_previous);
    assert_eq!(first.draft.version, 2);

    let second = store
        .register_image(&id, "front_view", "images/front_2.jpg")
        .expect("second register");
    assert!(second.replaced_previous);
    assert_eq!(second.draft.images["front_view"], "images/front_2.jpg");
    assert!(!images.join("front_1.jpg").exists());
    assert!(!images.join("thumb_front_1.jpg").exists());
    assert!(images.join("front_2.jpg").exists());
}

#[test]
fn discard_removes_document_snapshots_and_images() {
    let (_tmp, store) = store();
    let draft = store.create("guest", 1).expect("create");
    let id = draft.draft_id.clone();
    let images = store.layout().images_dir();

    fs::write(images.join("a.jpg"), b"a").expect("write");
    fs::write(images.join("thumb_a.jpg"), b"at").expect("write");
    store
        .register_image(&id, "front_view", "images/a.jpg")
        .expect("register");
    store.update(&id, patch("k", "v"), None).expect("update");

    let report = store.discard(&id).expect("discard");
    assert_eq!(report.deleted_images, 1);
    assert!(report.deleted_files >= 2); // document + at least one snapshot
    assert!(report.warnings.is_empty());
    assert_eq!(store.load(&id), Err(StoreError::NotFound));
    assert!(!images.join("a.jpg").exists());
    assert!(!images.join("thumb_a.jpg").exists());

    // Second discard of the same draft: nothing left, still a success.
    let again = store.discard(&id).expect("discard again");
    assert_eq!(again.deleted_images, 0);
    assert_eq!(again.deleted_files, 0);
}

#[test]
fn discard_of_unknown_draft_succeeds_with_zero_counts() {
    let (_tmp, store) = store();
    let id = DraftId::parse("draft_never_existed").expect("id");
    let report = store.discard(&id).expect("discard");
    assert_eq!(report.deleted_images, 0);
    assert_eq!(report.deleted_files, 0);
}

#[test]
fn discard_with_corrupt_registry_still_removes_document() {
    let (_tmp, store) = store();
    let id = DraftId::parse("draft_corrupt").expect("id");
    fs::write(store.layout().draft_path(&id), b"][").expect("write");

    let report = store.discard(&id).expect("discard");
    assert_eq!(report.deleted_files, 1);
    assert!(!report.warnings.is_empty());
    assert!(!store.layout().draft_path(&id).exists());
}

#[test]
fn delete_document_leaves_images_behind() {
    let (_tmp, store) = store();
    let draft = store.create("guest", 1).expect("create");
    let id = draft.draft_id.clone();
    let image = store.layout().images_dir().join("keep.jpg");
    fs::write(&image, b"k").expect("write");
    store
        .register_image(&id, "front_view", "images/keep.jpg")
        .expect("register");

    let report = store.delete_document(&id).expect("delete");
    assert_eq!(report.deleted_images, 0);
    assert_eq!(store.load(&id), Err(StoreError::NotFound));
    assert!(image.exists());
}

#[test]
fn document_listing_skips_snapshots_and_locks() {
    let (_tmp, store) = store();
    let a = store.create("guest", 1).expect("create");
    let b = store.create("guest", 1).expect("create");
    store
        .update(&a.draft_id, patch("k", "v"), None)
        .expect("update");
    fs::write(store.layout().lock_path(&b.draft_id), b"").expect("lock");

    let docs = store.list_draft_documents().expect("list");
    assert_eq!(docs.len(), 2);
    let mut expected = vec![
        store.layout().draft_path(&a.draft_id),
        store.layout().draft_path(&b.draft_id),
    ];
    expected.sort();
    assert_eq!(docs, expected);
}
