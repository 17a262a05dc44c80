#![forbid(unsafe_code)]

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use pdi_core::unix_seconds_now;
use pdi_store::{DraftStore, RetentionSweeper, StorageLayout, SweepConfig};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tracing::{error, info};

pub const CRATE_NAME: &str = "pdi-server";

pub mod config;
mod http;
pub mod intake;
pub mod notify;
pub mod render;
pub mod submission;

pub use config::{validate_startup_config_contract, MailConfig, ServerConfig};
pub use intake::{ImageIntake, IntakeError, StoredImage};
pub use notify::{FakeNotifier, HttpMailer, Notifier, NotifyError, ReportMeta};
pub use render::{RenderError, RenderedReport, ReportRenderer, MISSING_PLACEHOLDER};
pub use submission::{SubmissionPipeline, SubmitError, SubmitOutcome};

#[derive(Clone)]
pub struct AppState {
    pub store: DraftStore,
    pub sweeper: RetentionSweeper,
    pub intake: ImageIntake,
    pub pipeline: SubmissionPipeline,
    pub config: ServerConfig,
    pub(crate) request_id_seed: Arc<AtomicU64>,
}

impl AppState {
    #[must_use]
    pub fn new(layout: StorageLayout, config: ServerConfig, notifier: Arc<dyn Notifier>) -> Self {
        let store = DraftStore::with_lock_timeout(layout.clone(), config.lock_timeout);
        let sweeper = RetentionSweeper::new(
            store.clone(),
            SweepConfig {
                active_ttl: config.active_draft_ttl,
                archived_ttl: config.archived_draft_ttl,
            },
        );
        let intake = ImageIntake::new(layout.clone(), config.max_upload_bytes, config.thumbnail_max_px);
        let renderer = ReportRenderer::new(layout);
        let pipeline =
            SubmissionPipeline::new(store.clone(), sweeper.clone(), renderer, notifier);
        Self {
            store,
            sweeper,
            intake,
            pipeline,
            config,
            request_id_seed: Arc::new(AtomicU64::new(1)),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(http::healthz_handler))
        .route(
            "/v1/drafts",
            post(http::create_draft_handler).delete(http::delete_draft_handler),
        )
        .route("/v1/drafts/load", get(http::load_draft_handler))
        .route("/v1/drafts/update", post(http::update_draft_handler))
        .route("/v1/drafts/discard", post(http::discard_draft_handler))
        .route("/v1/drafts/archive", post(http::archive_draft_handler))
        .route("/v1/images", post(http::upload_image_handler))
        .route("/v1/submit", post(http::submit_handler))
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .with_state(state)
}

/// Periodic age and orphan sweeps on a fixed interval.
pub fn spawn_background_sweeps(state: &AppState) {
    let sweeper = state.sweeper.clone();
    let interval = state.config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            let sweeper = sweeper.clone();
            let joined = tokio::task::spawn_blocking(move || {
                let aged = sweeper.sweep_aged(unix_seconds_now());
                let orphans = sweeper.sweep_orphans();
                (aged, orphans)
            })
            .await;
            match joined {
                Ok((aged, orphans)) => {
                    match aged {
                        Ok(report) => info!(
                            examined = report.examined,
                            discarded = report.discarded_drafts,
                            warnings = report.warnings.len(),
                            "age sweep complete"
                        ),
                        Err(e) => error!(error = %e, "age sweep failed"),
                    }
                    if let Err(e) = orphans {
                        error!(error = %e, "orphan sweep failed");
                    }
                }
                Err(e) => error!(error = %e, "sweep task panicked"),
            }
        }
    });
}

#[cfg(test)]
mod submission_tests;
