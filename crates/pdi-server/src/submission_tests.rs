use crate::notify::{FakeNotifier, Notifier, NotifyError};
use crate::render::ReportRenderer;
use crate::submission::{SubmissionPipeline, SubmitError};
use image::{ImageFormat, RgbImage};
use pdi_model::{DraftId, FieldValue};
use pdi_store::{DraftStore, RetentionSweeper, StorageLayout, StoreError, SweepConfig};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

const GENERATED_AT: i64 = 1_700_000_000;

struct Fixture {
    _tmp: TempDir,
    layout: StorageLayout,
    store: DraftStore,
    notifier: Arc<FakeNotifier>,
    pipeline: SubmissionPipeline,
}

fn fixture() -> Fixture {
    let tmp = tempdir().expect("tempdir");
    let layout = StorageLayout::new(tmp.path().to_path_buf()).expect("layout");
    let store = DraftStore::new(layout.clone());
    let sweeper = RetentionSweeper::new(store.clone(), SweepConfig::default());
    let notifier = Arc::new(FakeNotifier::default());
    let pipeline = SubmissionPipeline::new(
        store.clone(),
        sweeper,
        ReportRenderer::new(layout.clone()),
        notifier.clone() as Arc<dyn Notifier>,
    );
    Fixture {
        _tmp: tmp,
        layout,
        store,
        notifier,
        pipeline,
    }
}

fn final_fields() -> BTreeMap<String, FieldValue> {
    BTreeMap::from([
        ("booking_id".to_string(), FieldValue::from("BK-9")),
        ("customer_name".to_string(), FieldValue::from("Sam Smith")),
    ])
}

/// Creates a draft with one registered photo, returning its id.
fn seeded_draft(fx: &Fixture) -> DraftId {
    let draft = fx.store.create("inspector-1", 1).expect("create");
    let img = RgbImage::from_pixel(320, 240, image::Rgb([200, 30, 30]));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png).expect("encode");
    let abs = fx.layout.images_dir().join("front_1_aa.png");
    std::fs::write(&abs, bytes.into_inner()).expect("write image");
    fx.store
        .register_image(&draft.draft_id, "front_view", "images/front_1_aa.png")
        .expect("register");
    draft.draft_id
}

#[test]
fn submit_renders_the_report_and_discards_the_draft() {
    let fx = fixture();
    let id = seeded_draft(&fx);

    let outcome = fx
        .pipeline
        .submit(&id, final_fields(), GENERATED_AT)
        .expect("submit");

    let pdf_abs = fx.layout.resolve(&outcome.pdf_path).expect("resolve");
    assert!(pdf_abs.is_file());
    assert!(outcome.pdf_path.starts_with("reports/inspection_BK-9_"));
    assert_eq!(outcome.meta.booking_id, "BK-9");
    assert_eq!(outcome.meta.customer_name, "Sam Smith");

    // The draft and its image are gone; the PDF is not.
    assert_eq!(fx.store.load(&id), Err(StoreError::NotFound));
    assert!(!fx.layout.images_dir().join("front_1_aa.png").exists());
}

#[test]
fn submit_of_unknown_draft_is_not_found() {
    let fx = fixture();
    let id = DraftId::parse("draft_missing").expect("id");
    let err = fx
        .pipeline
        .submit(&id, final_fields(), GENERATED_AT)
        .expect_err("missing draft");
    assert_eq!(err, SubmitError::Store(StoreError::NotFound));
}

#[tokio::test]
async fn successful_delivery_deletes_the_report() {
    let fx = fixture();
    let id = seeded_draft(&fx);
    let outcome = fx
        .pipeline
        .submit(&id, final_fields(), GENERATED_AT)
        .expect("submit");

    assert!(fx.pipeline.deliver_and_sweep(&outcome).await);
    let pdf_abs = fx.layout.resolve(&outcome.pdf_path).expect("resolve");
    assert!(!pdf_abs.exists());

    let sent = fx.notifier.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.booking_id, "BK-9");
}

#[tokio::test]
async fn failed_delivery_preserves_the_report_for_retry() {
    let fx = fixture();
    let id = seeded_draft(&fx);
    let outcome = fx
        .pipeline
        .submit(&id, final_fields(), GENERATED_AT)
        .expect("submit");
    let pdf_abs = fx.layout.resolve(&outcome.pdf_path).expect("resolve");

    *fx.notifier.fail_with.lock().await =
        Some(NotifyError::Delivery("gateway returned 502".to_string()));
    assert!(!fx.pipeline.deliver_and_sweep(&outcome).await);
    assert!(pdf_abs.is_file());

    // A later retry finds the report and cleans up after success.
    *fx.notifier.fail_with.lock().await = None;
    assert!(fx.pipeline.deliver_and_sweep(&outcome).await);
    assert!(!pdf_abs.exists());
}

#[tokio::test]
async fn skipped_delivery_also_preserves_the_report() {
    let fx = fixture();
    let id = seeded_draft(&fx);
    let outcome = fx
        .pipeline
        .submit(&id, final_fields(), GENERATED_AT)
        .expect("submit");

    *fx.notifier.fail_with.lock().await =
        Some(NotifyError::NotAttempted("mail is disabled".to_string()));
    assert!(!fx.pipeline.deliver_and_sweep(&outcome).await);
    assert!(fx.layout.resolve(&outcome.pdf_path).expect("resolve").is_file());
    assert!(fx.notifier.sent.lock().await.is_empty());
}

#[test]
fn missing_photo_surfaces_as_a_warning_not_a_failure() {
    let fx = fixture();
    let id = seeded_draft(&fx);
    // Delete the photo behind the registry's back.
    std::fs::remove_file(fx.layout.images_dir().join("front_1_aa.png")).expect("remove");

    let outcome = fx
        .pipeline
        .submit(&id, final_fields(), GENERATED_AT)
        .expect("submit");
    assert!(!outcome.warnings.is_empty());
    assert!(fx.layout.resolve(&outcome.pdf_path).expect("resolve").is_file());
}
