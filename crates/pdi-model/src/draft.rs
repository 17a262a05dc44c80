use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValidationError {}

pub const DRAFT_ID_MAX_LEN: usize = 64;

/// Opaque identifier of one in-progress inspection draft.
///
/// Ids double as file stems under the drafts directory, so the accepted
/// alphabet is restricted to characters that are safe in a path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
#[non_exhaustive]
pub struct DraftId(String);

impl DraftId {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(ValidationError("draft id must not be empty".to_string()));
        }
        if s.len() > DRAFT_ID_MAX_LEN {
            return Err(ValidationError(format!(
                "draft id exceeds max length {DRAFT_ID_MAX_LEN}"
            )));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ValidationError(
                "draft id must match [A-Za-z0-9_-]+".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }

    #[must_use]
    pub fn generate() -> Self {
        Self(format!("draft_{}", uuid::Uuid::new_v4().simple()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for DraftId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A form field value: scalar for text inputs, list for checkbox groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    One(String),
    Many(Vec<String>),
}

impl FieldValue {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(s) => s.trim().is_empty(),
            Self::Many(items) => items.iter().all(|s| s.trim().is_empty()),
        }
    }

    /// Flattened display form used by the report renderer.
    #[must_use]
    pub fn joined(&self) -> String {
        match self {
            Self::One(s) => s.clone(),
            Self::Many(items) => items.join(", "),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::One(s.to_string())
    }
}

/// One draft document as persisted on disk.
///
/// Every mutation rewrites the whole document and bumps `version`; the
/// `images` map holds storage-relative paths only (see `is_storage_relative`).
/// Unknown keys from older documents are tolerated, absent keys default, so
/// schema evolution never turns a loadable draft into `InvalidDocument`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub draft_id: DraftId,
    pub version: u64,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub archived_at: Option<i64>,
    #[serde(default)]
    pub submission_id: Option<String>,
    #[serde(default = "default_step")]
    pub current_step: u32,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub images: BTreeMap<String, String>,
}

fn default_step() -> u32 {
    1
}

impl Draft {
    #[must_use]
    pub fn new(draft_id: DraftId, owner_id: &str, current_step: u32, now: i64) -> Self {
        Self {
            draft_id,
            version: 1,
            created_at: now,
            updated_at: now,
            owner_id: owner_id.to_string(),
            archived: false,
            archived_at: None,
            submission_id: None,
            current_step,
            fields: BTreeMap::new(),
            images: BTreeMap::new(),
        }
    }

    /// Last-write-wins merge of a field patch; the caller bumps the version.
    pub fn merge_fields(&mut self, patch: BTreeMap<String, FieldValue>) {
        for (key, value) in patch {
            self.fields.insert(key, value);
        }
    }

    /// Reference timestamp for age-based retention decisions.
    #[must_use]
    pub fn retention_timestamp(&self) -> i64 {
        if self.archived {
            self.archived_at.unwrap_or(self.updated_at)
        } else {
            self.updated_at
        }
    }
}
