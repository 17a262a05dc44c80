use crate::intake::IntakeError;
use crate::submission::SubmitError;
use crate::AppState;
use axum::extract::{Multipart, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use pdi_api::{
    AckResponse, ApiError, ArchiveRequest, CreateDraftRequest, CreateDraftResponse,
    DiscardResponse, DraftIdRequest, ImageUploadResponse, SubmitRequest, SubmitResponse,
    UpdateDraftRequest, UpdateDraftResponse,
};
use pdi_core::unix_seconds_now;
use pdi_model::DraftId;
use pdi_store::StoreError;
use serde::Deserialize;
use std::sync::atomic::Ordering;
use tracing::{error, info};

pub(crate) fn api_error_response(status: StatusCode, err: ApiError) -> Response {
    (status, Json(serde_json::json!({"error": err}))).into_response()
}

pub(crate) fn make_request_id(state: &AppState) -> String {
    let id = state.request_id_seed.fetch_add(1, Ordering::Relaxed);
    format!("req-{id:016x}")
}

pub(crate) fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(v) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", v);
    }
    response
}

/// Maps store failures onto the wire contract. Disk and corruption details
/// go to the log only.
fn store_error_response(operation: &str, draft_id: &str, err: &StoreError) -> Response {
    match err {
        StoreError::NotFound => api_error_response(
            StatusCode::NOT_FOUND,
            ApiError::draft_not_found(draft_id),
        ),
        StoreError::Busy => {
            api_error_response(StatusCode::CONFLICT, ApiError::draft_busy(draft_id))
        }
        StoreError::InvalidDocument(msg) => {
            error!(operation, draft_id, error = %msg, "draft document corrupt");
            api_error_response(StatusCode::INTERNAL_SERVER_ERROR, ApiError::internal())
        }
        StoreError::Io(msg) => {
            error!(operation, draft_id, error = %msg, "storage failure");
            api_error_response(StatusCode::INTERNAL_SERVER_ERROR, ApiError::internal())
        }
    }
}

fn parse_draft_id(raw: &str) -> Result<DraftId, Response> {
    DraftId::parse(raw).map_err(|_| {
        api_error_response(
            StatusCode::BAD_REQUEST,
            ApiError::invalid_param("draft_id", raw),
        )
    })
}

pub(crate) async fn healthz_handler(State(state): State<AppState>) -> impl IntoResponse {
    let request_id = make_request_id(&state);
    with_request_id((StatusCode::OK, "ok").into_response(), &request_id)
}

pub(crate) async fn create_draft_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateDraftRequest>,
) -> Response {
    let request_id = make_request_id(&state);
    let owner = req.owner_id.unwrap_or_else(|| "anonymous".to_string());
    let step = req.initial_step.unwrap_or(1);
    let result = state.store.create(&owner, step);
    let resp = match result {
        Ok(draft) => Json(CreateDraftResponse {
            draft_id: draft.draft_id.into_inner(),
            version: draft.version,
        })
        .into_response(),
        Err(e) => store_error_response("create", "-", &e),
    };
    with_request_id(resp, &request_id)
}

pub(crate) async fn update_draft_handler(
    State(state): State<AppState>,
    Json(req): Json<UpdateDraftRequest>,
) -> Response {
    let request_id = make_request_id(&state);
    let id = match parse_draft_id(&req.draft_id) {
        Ok(id) => id,
        Err(resp) => return with_request_id(resp, &request_id),
    };
    let resp = match state.store.update(&id, req.fields, req.step) {
        Ok(draft) => Json(UpdateDraftResponse {
            version: draft.version,
        })
        .into_response(),
        Err(e) => store_error_response("update", id.as_str(), &e),
    };
    with_request_id(resp, &request_id)
}

#[derive(Debug, Deserialize)]
pub(crate) struct DraftIdQuery {
    draft_id: String,
}

pub(crate) async fn load_draft_handler(
    State(state): State<AppState>,
    Query(query): Query<DraftIdQuery>,
) -> Response {
    let request_id = make_request_id(&state);
    let id = match parse_draft_id(&query.draft_id) {
        Ok(id) => id,
        Err(resp) => return with_request_id(resp, &request_id),
    };
    let resp = match state.store.load(&id) {
        Ok(draft) => Json(draft).into_response(),
        // A corrupt document is indistinguishable from absent for readers.
        Err(StoreError::InvalidDocument(msg)) => {
            error!(draft_id = %id, error = %msg, "draft document corrupt");
            store_error_response("load", id.as_str(), &StoreError::NotFound)
        }
        Err(e) => store_error_response("load", id.as_str(), &e),
    };
    with_request_id(resp, &request_id)
}

pub(crate) async fn discard_draft_handler(
    State(state): State<AppState>,
    Json(req): Json<DraftIdRequest>,
) -> Response {
    let request_id = make_request_id(&state);
    let id = match parse_draft_id(&req.draft_id) {
        Ok(id) => id,
        Err(resp) => return with_request_id(resp, &request_id),
    };
    let resp = match state.store.discard(&id) {
        Ok(report) => Json(DiscardResponse {
            deleted_images: report.deleted_images,
            deleted_files: report.deleted_files,
            warnings: report.warnings,
        })
        .into_response(),
        Err(e) => store_error_response("discard", id.as_str(), &e),
    };
    with_request_id(resp, &request_id)
}

pub(crate) async fn archive_draft_handler(
    State(state): State<AppState>,
    Json(req): Json<ArchiveRequest>,
) -> Response {
    let request_id = make_request_id(&state);
    let id = match parse_draft_id(&req.draft_id) {
        Ok(id) => id,
        Err(resp) => return with_request_id(resp, &request_id),
    };
    let resp = match state.store.archive(&id, &req.submission_id) {
        Ok(_) => Json(AckResponse { ok: true }).into_response(),
        Err(e) => store_error_response("archive", id.as_str(), &e),
    };
    with_request_id(resp, &request_id)
}

pub(crate) async fn delete_draft_handler(
    State(state): State<AppState>,
    Query(query): Query<DraftIdQuery>,
) -> Response {
    let request_id = make_request_id(&state);
    let id = match parse_draft_id(&query.draft_id) {
        Ok(id) => id,
        Err(resp) => return with_request_id(resp, &request_id),
    };
    let resp = match state.store.delete_document(&id) {
        Ok(_) => Json(AckResponse { ok: true }).into_response(),
        Err(e) => store_error_response("delete", id.as_str(), &e),
    };
    with_request_id(resp, &request_id)
}

fn intake_error_response(err: &IntakeError) -> Response {
    match err {
        IntakeError::TooLarge { limit_bytes } => api_error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::payload_too_large(*limit_bytes),
        ),
        IntakeError::Empty
        | IntakeError::UnsupportedExtension(_)
        | IntakeError::UnsupportedFormat(_)
        | IntakeError::Decode(_) => api_error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::unsupported_image(&err.to_string()),
        ),
        IntakeError::Io(msg) => {
            error!(error = %msg, "image store failure");
            api_error_response(StatusCode::INTERNAL_SERVER_ERROR, ApiError::internal())
        }
    }
}

pub(crate) async fn upload_image_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Response {
    let request_id = make_request_id(&state);

    let mut draft_id_raw: Option<String> = None;
    let mut field_name: Option<String> = None;
    let mut file: Option<(String, Vec<u8>)> = None;
    loop {
        let part = match multipart.next_field().await {
            Ok(Some(part)) => part,
            Ok(None) => break,
            Err(e) => {
                let resp = api_error_response(
                    StatusCode::BAD_REQUEST,
                    ApiError::invalid_param("multipart", &e.to_string()),
                );
                return with_request_id(resp, &request_id);
            }
        };
        match part.name().unwrap_or_default() {
            "draft_id" => draft_id_raw = part.text().await.ok(),
            "field_name" => field_name = part.text().await.ok(),
            "file" => {
                let client_name = part.file_name().unwrap_or_default().to_string();
                match part.bytes().await {
                    Ok(bytes) => file = Some((client_name, bytes.to_vec())),
                    Err(e) => {
                        let resp = api_error_response(
                            StatusCode::BAD_REQUEST,
                            ApiError::invalid_param("file", &e.to_string()),
                        );
                        return with_request_id(resp, &request_id);
                    }
                }
            }
            _ => {}
        }
    }

    let Some(field_name) = field_name.filter(|f| !f.trim().is_empty()) else {
        let resp = api_error_response(
            StatusCode::BAD_REQUEST,
            ApiError::invalid_param("field_name", "(missing)"),
        );
        return with_request_id(resp, &request_id);
    };
    let Some((client_name, bytes)) = file else {
        let resp = api_error_response(
            StatusCode::BAD_REQUEST,
            ApiError::invalid_param("file", "(missing)"),
        );
        return with_request_id(resp, &request_id);
    };

    // An upload without a draft starts one; the first photo is often taken
    // before any form field is filled in.
    let id = match draft_id_raw.filter(|v| !v.trim().is_empty()) {
        Some(raw) => match parse_draft_id(&raw) {
            Ok(id) => id,
            Err(resp) => return with_request_id(resp, &request_id),
        },
        None => match state.store.create("anonymous", 1) {
            Ok(draft) => draft.draft_id,
            Err(e) => return with_request_id(store_error_response("create", "-", &e), &request_id),
        },
    };

    let intake = state.intake.clone();
    let intake_field = field_name.clone();
    let stored = tokio::task::spawn_blocking(move || {
        intake.accept(&intake_field, &client_name, &bytes, unix_seconds_now())
    })
    .await;
    let stored = match stored {
        Ok(Ok(stored)) => stored,
        Ok(Err(e)) => return with_request_id(intake_error_response(&e), &request_id),
        Err(e) => {
            error!(error = %e, "image intake task failed");
            let resp =
                api_error_response(StatusCode::INTERNAL_SERVER_ERROR, ApiError::internal());
            return with_request_id(resp, &request_id);
        }
    };

    let resp = match state
        .store
        .register_image(&id, &field_name, &stored.stored_path)
    {
        Ok(outcome) => Json(ImageUploadResponse {
            draft_id: id.as_str().to_string(),
            stored_path: stored.stored_path,
            thumb_path: stored.thumb_path,
            width: stored.width,
            height: stored.height,
            checksum: stored.checksum,
            version: outcome.draft.version,
            replaced_previous: outcome.replaced_previous,
        })
        .into_response(),
        Err(e) => store_error_response("register_image", id.as_str(), &e),
    };
    with_request_id(resp, &request_id)
}

pub(crate) async fn submit_handler(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Response {
    let request_id = make_request_id(&state);
    let id = match parse_draft_id(&req.draft_id) {
        Ok(id) => id,
        Err(resp) => return with_request_id(resp, &request_id),
    };
    info!(request_id = %request_id, draft_id = %id, "submission start");

    let pipeline = state.pipeline.clone();
    let submit_id = id.clone();
    let joined = tokio::task::spawn_blocking(move || {
        pipeline.submit(&submit_id, req.fields, unix_seconds_now())
    })
    .await;
    let outcome = match joined {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(SubmitError::Store(e))) => {
            return with_request_id(store_error_response("submit", id.as_str(), &e), &request_id)
        }
        Ok(Err(SubmitError::Render(e))) => {
            error!(draft_id = %id, error = %e, "report rendering failed");
            let resp =
                api_error_response(StatusCode::INTERNAL_SERVER_ERROR, ApiError::render_failed());
            return with_request_id(resp, &request_id);
        }
        Err(e) => {
            error!(draft_id = %id, error = %e, "submission task failed");
            let resp =
                api_error_response(StatusCode::INTERNAL_SERVER_ERROR, ApiError::internal());
            return with_request_id(resp, &request_id);
        }
    };

    // Respond as soon as the PDF exists; delivery and the post-delivery
    // sweep run behind the response.
    let pipeline = state.pipeline.clone();
    let background = outcome.clone();
    tokio::spawn(async move {
        pipeline.deliver_and_sweep(&background).await;
    });

    let resp = Json(SubmitResponse {
        pdf_path: outcome.pdf_path,
        warnings: outcome.warnings,
    })
    .into_response();
    with_request_id(resp, &request_id)
}
