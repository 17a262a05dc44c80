#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

pub const CRATE_NAME: &str = "pdi-store";

mod delete;
mod draft_store;
mod layout;
mod sweeper;

pub use delete::{remove_file_best_effort, DeleteOutcome};
pub use draft_store::{DiscardReport, DraftStore, RegisterOutcome};
pub use layout::{StorageLayout, DRAFTS_DIR, IMAGES_DIR, REPORTS_DIR, THUMB_PREFIX};
pub use sweeper::{RetentionSweeper, SweepConfig, SweepReport};

/// Failure taxonomy for draft storage.
///
/// `NotFound` and `Busy` are expected outcomes the caller handles; `Io` is a
/// disk or permission failure; `InvalidDocument` means the JSON on disk is
/// corrupt — surfaced, never a panic, so the caller can decide whether to
/// treat the draft as missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound,
    InvalidDocument(String),
    Busy,
    Io(String),
}

impl StoreError {
    pub(crate) fn io(err: impl Display) -> Self {
        Self::Io(err.to_string())
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "draft not found"),
            Self::InvalidDocument(msg) => write!(f, "invalid draft document: {msg}"),
            Self::Busy => write!(f, "draft is locked by another writer"),
            Self::Io(msg) => write!(f, "storage i/o failure: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[cfg(test)]
mod draft_store_tests;
#[cfg(test)]
mod sweeper_tests;
