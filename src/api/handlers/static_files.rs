use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use super::database_error;
use crate::api::response::ApiError;
use crate::object_store::{validate_key, ObjectStoreError};
use crate::AppState;

/// Serve raw content by storage key.
/// Route: GET /uploads/*key
///
/// Only keys that belong to a record are served, so staging leftovers and
/// orphaned files stay unreachable.
pub async fn serve_upload(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    if validate_key(&key).is_err() {
        return Err(ApiError::not_found("File not found"));
    }

    let record = state
        .db
        .get_artifact_by_key(&key)
        .map_err(database_error)?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    let data = state
        .object_store
        .get(&record.storage_key)
        .await
        .map_err(|e| match e {
            ObjectStoreError::NotFound(_) => ApiError::not_found("File content not found"),
            _ => ApiError::internal(format!("Failed to retrieve file: {e}")),
        })?;

    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();

    let mime = mime_guess::from_path(&record.storage_key).first_or_octet_stream();
    headers.insert(
        header::CONTENT_TYPE,
        mime.as_ref()
            .parse()
            .unwrap_or(header::HeaderValue::from_static("application/octet-stream")),
    );

    // Saved maps are rewritten in place, so keep caching short
    headers.insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("private, max-age=60"),
    );

    Ok(response)
}
