#![forbid(unsafe_code)]

pub const CRATE_NAME: &str = "pdi-model";

mod draft;
mod paths;
mod report;

pub use draft::{Draft, DraftId, FieldValue, ValidationError, DRAFT_ID_MAX_LEN};
pub use paths::{is_storage_relative, sanitize_token};
pub use report::{report_file_name, REPORT_EXTENSION};
