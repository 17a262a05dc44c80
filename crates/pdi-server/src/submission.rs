use crate::notify::{Notifier, NotifyError, ReportMeta};
use crate::render::{RenderError, ReportRenderer};
use pdi_model::{DraftId, FieldValue};
use pdi_store::{DraftStore, RetentionSweeper, StoreError};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::fs;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    Store(StoreError),
    Render(RenderError),
}

impl Display for SubmitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(e) => write!(f, "{e}"),
            Self::Render(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SubmitError {}

impl From<StoreError> for SubmitError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<RenderError> for SubmitError {
    fn from(e: RenderError) -> Self {
        Self::Render(e)
    }
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// Storage-relative location of the rendered PDF.
    pub pdf_path: String,
    pub meta: ReportMeta,
    pub warnings: Vec<String>,
}

/// Drives a submission end to end: persist the final field state, render
/// the PDF, discard the draft, then (separately) deliver and clean up.
///
/// `submit` and `deliver_and_sweep` are split so the HTTP layer can respond
/// as soon as the PDF exists and run delivery in the background. The PDF is
/// deleted only after the notifier confirms success; any delivery failure
/// leaves it in place for a retry.
#[derive(Clone)]
pub struct SubmissionPipeline {
    store: DraftStore,
    sweeper: RetentionSweeper,
    renderer: ReportRenderer,
    notifier: Arc<dyn Notifier>,
}

impl SubmissionPipeline {
    #[must_use]
    pub fn new(
        store: DraftStore,
        sweeper: RetentionSweeper,
        renderer: ReportRenderer,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            sweeper,
            renderer,
            notifier,
        }
    }

    /// Blocking part of the flow: render and immediate sweep. Returns once
    /// the PDF is durably on disk and the draft is gone.
    pub fn submit(
        &self,
        id: &DraftId,
        final_fields: BTreeMap<String, FieldValue>,
        generated_at: i64,
    ) -> Result<SubmitOutcome, SubmitError> {
        let draft = if final_fields.is_empty() {
            self.store.load(id)?
        } else {
            self.store.update(id, final_fields, None)?
        };

        let rendered = self.renderer.render(&draft, generated_at)?;
        let mut warnings = rendered.warnings;

        let abs = self.store.layout().reports_dir().join(&rendered.file_name);
        let tmp = abs.with_extension("pdf.tmp");
        fs::write(&tmp, &rendered.bytes)
            .map_err(|e| StoreError::Io(format!("report write failed: {e}")))?;
        fs::rename(&tmp, &abs)
            .map_err(|e| StoreError::Io(format!("report publish failed: {e}")))?;
        let pdf_path = self
            .store
            .layout()
            .to_storage_relative(&abs)
            .map_err(SubmitError::Store)?;

        match self.sweeper.sweep_after_submission(id) {
            Ok(report) => warnings.extend(report.warnings),
            Err(e) => {
                // The report already exists; a failed sweep is recoverable
                // by the periodic passes.
                warn!(draft_id = %id, error = %e, "post-submission sweep failed");
                warnings.push(format!("post-submission sweep failed: {e}"));
            }
        }

        let meta = ReportMeta {
            booking_id: field_or_unknown(&draft.fields, "booking_id"),
            customer_name: field_or_unknown(&draft.fields, "customer_name"),
            pdf_file_name: rendered.file_name,
        };
        info!(draft_id = %id, pdf = %pdf_path, "submission rendered");
        Ok(SubmitOutcome {
            pdf_path,
            meta,
            warnings,
        })
    }

    /// Emails the report and, only on confirmed delivery, deletes it.
    /// Returns whether the report was delivered.
    pub async fn deliver_and_sweep(&self, outcome: &SubmitOutcome) -> bool {
        let abs = match self.store.layout().resolve(&outcome.pdf_path) {
            Ok(abs) => abs,
            Err(e) => {
                error!(pdf = %outcome.pdf_path, error = %e, "report path unresolvable");
                return false;
            }
        };
        match self.notifier.send(&abs, &outcome.meta).await {
            Ok(()) => {
                let report = self.sweeper.sweep_after_delivery(&outcome.pdf_path);
                for warning in &report.warnings {
                    warn!(pdf = %outcome.pdf_path, warning, "post-delivery cleanup issue");
                }
                true
            }
            Err(NotifyError::NotAttempted(msg)) => {
                info!(pdf = %outcome.pdf_path, reason = %msg, "delivery skipped; report kept");
                false
            }
            Err(NotifyError::Delivery(msg)) => {
                error!(
                    booking_id = %outcome.meta.booking_id,
                    pdf = %outcome.pdf_path,
                    error = %msg,
                    "delivery failed; report kept for retry"
                );
                false
            }
        }
    }
}

fn field_or_unknown(fields: &BTreeMap<String, FieldValue>, key: &str) -> String {
    fields
        .get(key)
        .map(|v| v.joined())
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
