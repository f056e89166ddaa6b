use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use bytes::Bytes;
use tracing::{instrument, warn};

use super::dto::{PresignRequest, PresignResponse, UploadRequest, UploadResponse};
use super::services::{with_deadline, BLOB_DEADLINE};
use crate::state::AppState;

pub fn storage_routes() -> Router<AppState> {
    Router::new()
        .route("/storage/objects", post(upload_object))
        .route("/storage/presign", post(presign_object))
}

#[instrument(skip(state, payload))]
pub async fn upload_object(
    State(state): State<AppState>,
    Json(payload): Json<UploadRequest>,
) -> Result<(StatusCode, Json<UploadResponse>), (StatusCode, String)> {
    let stored = with_deadline(
        BLOB_DEADLINE,
        state.objects.upload_object(
            payload.bucket.as_deref(),
            &payload.object_name,
            Bytes::from(payload.content),
            payload.content_type.as_deref(),
        ),
    )
    .await
    .map_err(|e| {
        warn!(error = %e, object = %payload.object_name, "upload_object failed");
        e
    })?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            bucket: stored.bucket,
            object_name: stored.object_name,
            etag: stored.etag,
            size: stored.size,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn presign_object(
    State(state): State<AppState>,
    Json(payload): Json<PresignRequest>,
) -> Result<Json<PresignResponse>, (StatusCode, String)> {
    let (url, expiry) = with_deadline(
        BLOB_DEADLINE,
        state.objects.presigned_url(
            payload.bucket.as_deref(),
            &payload.object_name,
            payload.expiry_seconds,
        ),
    )
    .await
    .map_err(|e| {
        warn!(error = %e, "presign failed");
        e
    })?;

    Ok(Json(PresignResponse {
        url,
        expiry_seconds: expiry.as_secs(),
    }))
}
