#![forbid(unsafe_code)]

use pdi_model::FieldValue;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const CRATE_NAME: &str = "pdi-api";

#[must_use]
pub fn openapi_v1_spec() -> Value {
    json!({
      "openapi": "3.0.3",
      "info": {
        "title": "pdi-form API",
        "version": "v1"
      },
      "paths": {
        "/healthz": {"get": {"responses": {"200": {"description": "ok"}}}},
        "/v1/drafts": {
          "post": {"responses": {"200": {"description": "draft created"}}},
          "delete": {
            "parameters": [
              {"name": "draft_id", "in": "query", "required": true, "schema": {"type": "string"}}
            ],
            "responses": {
              "200": {"description": "document deleted"},
              "400": {"description": "invalid draft id", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}}
            }
          }
        },
        "/v1/drafts/load": {
          "get": {
            "parameters": [
              {"name": "draft_id", "in": "query", "required": true, "schema": {"type": "string"}}
            ],
            "responses": {
              "200": {"description": "full draft"},
              "404": {"description": "unknown draft", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}}
            }
          }
        },
        "/v1/drafts/update": {
          "post": {
            "responses": {
              "200": {"description": "new version"},
              "404": {"description": "unknown draft", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}},
              "409": {"description": "draft locked", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}}
            }
          }
        },
        "/v1/drafts/discard": {
          "post": {"responses": {"200": {"description": "deletion report"}}}
        },
        "/v1/drafts/archive": {
          "post": {
            "responses": {
              "200": {"description": "archived"},
              "404": {"description": "unknown draft", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}}
            }
          }
        },
        "/v1/images": {
          "post": {
            "responses": {
              "200": {"description": "image stored"},
              "413": {"description": "upload too large", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}},
              "422": {"description": "unsupported image", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}}
            }
          }
        },
        "/v1/submit": {
          "post": {
            "responses": {
              "200": {"description": "report rendered, delivery scheduled"},
              "404": {"description": "unknown draft", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}},
              "500": {"description": "render failed", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ApiError"}}}}
            }
          }
        }
      },
      "components": {
        "schemas": {
          "ApiErrorCode": {
            "type": "string",
            "enum": [
              "InvalidRequest",
              "DraftNotFound",
              "DraftBusy",
              "UnsupportedImage",
              "PayloadTooLarge",
              "RenderFailed",
              "Internal"
            ]
          },
          "ApiError": {
            "type": "object",
            "required": ["code", "message", "details"],
            "additionalProperties": false,
            "properties": {
              "code": {"$ref": "#/components/schemas/ApiErrorCode"},
              "message": {"type": "string"},
              "details": {"type": "object"}
            }
          }
        }
      }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ApiErrorCode {
    InvalidRequest,
    DraftNotFound,
    DraftBusy,
    UnsupportedImage,
    PayloadTooLarge,
    RenderFailed,
    Internal,
}

/// Wire shape of every non-2xx response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    pub details: Value,
}

impl ApiError {
    #[must_use]
    pub fn invalid_param(name: &str, value: &str) -> Self {
        Self {
            code: ApiErrorCode::InvalidRequest,
            message: format!("invalid request parameter: {name}"),
            details: json!({"parameter": name, "value": value}),
        }
    }

    #[must_use]
    pub fn draft_not_found(draft_id: &str) -> Self {
        Self {
            code: ApiErrorCode::DraftNotFound,
            message: "draft not found".to_string(),
            details: json!({"draft_id": draft_id}),
        }
    }

    #[must_use]
    pub fn draft_busy(draft_id: &str) -> Self {
        Self {
            code: ApiErrorCode::DraftBusy,
            message: "draft is locked by another writer; retry shortly".to_string(),
            details: json!({"draft_id": draft_id}),
        }
    }

    #[must_use]
    pub fn unsupported_image(reason: &str) -> Self {
        Self {
            code: ApiErrorCode::UnsupportedImage,
            message: format!("unsupported image: {reason}"),
            details: json!({"reason": reason}),
        }
    }

    #[must_use]
    pub fn payload_too_large(limit_bytes: u64) -> Self {
        Self {
            code: ApiErrorCode::PayloadTooLarge,
            message: "upload exceeds the size limit".to_string(),
            details: json!({"limit_bytes": limit_bytes}),
        }
    }

    #[must_use]
    pub fn render_failed() -> Self {
        Self {
            code: ApiErrorCode::RenderFailed,
            message: "report rendering failed".to_string(),
            details: json!({}),
        }
    }

    /// Deliberately detail-free: storage paths and upstream errors go to the
    /// log, never to the client.
    #[must_use]
    pub fn internal() -> Self {
        Self {
            code: ApiErrorCode::Internal,
            message: "internal error".to_string(),
            details: json!({}),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateDraftRequest {
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub initial_step: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateDraftResponse {
    pub draft_id: String,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateDraftRequest {
    pub draft_id: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub step: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateDraftResponse {
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DraftIdRequest {
    pub draft_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscardResponse {
    pub deleted_images: u64,
    pub deleted_files: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveRequest {
    pub draft_id: String,
    pub submission_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AckResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageUploadResponse {
    pub draft_id: String,
    pub stored_path: String,
    pub thumb_path: Option<String>,
    pub width: u32,
    pub height: u32,
    pub checksum: String,
    pub version: u64,
    pub replaced_previous: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitRequest {
    pub draft_id: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitResponse {
    pub pdf_path: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}
