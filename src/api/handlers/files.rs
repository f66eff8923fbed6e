use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use super::database_error;
use crate::api::auth::AuthUser;
use crate::api::response::{created, ApiError, AppJson, AppQuery};
use crate::artifacts::{self, load_owned, ArtifactError, MapUpdate, ParsedContent, Upload};
use crate::object_store::ObjectStoreError;
use crate::storage::models::{ArtifactOrigin, ArtifactRecord, FileType};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResponse {
    pub id: String,
    pub filename: String,
    pub file_type: FileType,
    pub origin: ArtifactOrigin,
    pub byte_size: u64,
    pub storage_key: String,
    pub uploaded_at: String,
    pub updated_at: String,
    /// Owner id
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_data: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub file: FileResponse,
    pub file_url: String,
}

#[derive(Debug, Serialize)]
pub struct MapSavedResponse {
    pub message: String,
    pub file: FileResponse,
}

/// Parsed content plus the metadata every read response carries
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContentResponse {
    #[serde(flatten)]
    pub content: ParsedContent,
    pub id: String,
    pub filename: String,
    pub file_type: FileType,
    pub uploaded_at: String,
    pub user: String,
}

#[derive(Debug, Serialize)]
pub struct MapContentResponse {
    #[serde(rename = "geoJSON")]
    pub geo_json: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ListFilesParams {
    #[serde(default, rename = "fileType")]
    pub file_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SaveMapRequest {
    #[serde(default, rename = "mapData")]
    pub map_data: Option<serde_json::Value>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMapRequest {
    #[serde(default, rename = "mapData", deserialize_with = "nullable")]
    pub map_data: Option<Option<serde_json::Value>>,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Distinguishes between a missing field (`None`) and an explicit `null` (`Some(None)`).
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: DeserializeOwned,
    D: Deserializer<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut upload: Option<Upload> = None;
    let mut declared_type: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("").to_string();

                let data = field.bytes().await.map_err(multipart_error)?;

                if data.len() as u64 > state.config.max_upload_size {
                    return Err(ApiError::payload_too_large(format!(
                        "File exceeds maximum upload size of {} bytes",
                        state.config.max_upload_size
                    )));
                }

                upload = Some(Upload { file_name, data });
            }
            "fileType" => {
                declared_type = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let record =
        artifacts::ingest_upload(&state, &caller.user_id, upload, declared_type.as_deref())
            .await?;
    let file_url = file_url(&state, &headers, &record);

    tracing::debug!(artifact_id = %record.id, file_url = %file_url, "Created file");

    Ok(created(UploadResponse {
        file: file_to_response(&record),
        file_url,
    }))
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    AppQuery(params): AppQuery<ListFilesParams>,
) -> Result<Json<Vec<FileResponse>>, ApiError> {
    let file_type: Option<FileType> = match params.file_type.as_deref() {
        Some(t) => Some(t.parse().map_err(|_| {
            ApiError::bad_request("fileType must be one of GeoJSON, KML, TIFF")
        })?),
        None => None,
    };

    let files = state
        .db
        .list_artifacts_by_owner(&caller.user_id)
        .map_err(database_error)?;

    Ok(Json(
        files
            .iter()
            .filter(|f| file_type.map_or(true, |t| f.file_type == t))
            .map(file_to_response)
            .collect(),
    ))
}

pub async fn list_saved_maps(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<Vec<FileResponse>>, ApiError> {
    let files = state
        .db
        .list_artifacts_by_owner(&caller.user_id)
        .map_err(database_error)?;

    Ok(Json(
        files
            .iter()
            .filter(|f| f.origin == ArtifactOrigin::Saved)
            .map(file_to_response)
            .collect(),
    ))
}

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<FileContentResponse>, ApiError> {
    let (record, content) = artifacts::read_owned(&state, &id, &caller.user_id).await?;

    Ok(Json(FileContentResponse {
        content,
        id: record.id,
        filename: record.filename,
        file_type: record.file_type,
        uploaded_at: record.uploaded_at.to_rfc3339(),
        user: record.owner_id,
    }))
}

pub async fn get_map(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<MapContentResponse>, ApiError> {
    let (_, geo_json) = artifacts::read_owned_map(&state, &id, &caller.user_id)
        .await
        .map_err(map_not_found)?;

    Ok(Json(MapContentResponse { geo_json }))
}

pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    Path(file_id): Path<String>,
) -> Result<Response, ApiError> {
    let record = load_owned(&state, &file_id, &caller.user_id)?;

    let reader = state
        .object_store
        .reader(&record.storage_key)
        .await
        .map_err(|e| match e {
            ObjectStoreError::NotFound(_) => ApiError::not_found("File content not found"),
            _ => ApiError::internal(format!("Error downloading file: {e}")),
        })?;

    let mut response =
        (StatusCode::OK, Body::from_stream(ReaderStream::new(reader))).into_response();
    let headers = response.headers_mut();

    let mime = mime_guess::from_path(&record.storage_key).first_or_octet_stream();
    headers.insert(
        header::CONTENT_TYPE,
        mime.as_ref()
            .parse()
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );

    let filename: String = record
        .filename
        .chars()
        .map(|c| if c == '"' || c.is_control() || !c.is_ascii() { '_' } else { c })
        .collect();
    if let Ok(value) = format!("attachment; filename=\"{filename}\"").parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok(response)
}

pub async fn save_map(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    AppJson(req): AppJson<SaveMapRequest>,
) -> Result<(StatusCode, Json<MapSavedResponse>), ApiError> {
    let record =
        artifacts::save_map(&state, &caller.user_id, req.filename.as_deref(), req.map_data).await?;

    Ok(created(MapSavedResponse {
        message: "Map saved successfully".to_string(),
        file: file_to_response(&record),
    }))
}

pub async fn update_map(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateMapRequest>,
) -> Result<Json<MapSavedResponse>, ApiError> {
    let update = MapUpdate {
        map_data: req
            .map_data
            .map(|v| v.unwrap_or(serde_json::Value::Null)),
        filename: req.filename,
    };
    let record = artifacts::update_map(&state, &caller.user_id, &id, update)
        .await
        .map_err(map_not_found)?;

    Ok(Json(MapSavedResponse {
        message: "Map updated successfully".to_string(),
        file: file_to_response(&record),
    }))
}

// ============================================================================
// Helpers
// ============================================================================

fn map_not_found(e: ArtifactError) -> ApiError {
    match e {
        ArtifactError::NotFound(_) => ApiError::not_found("Map not found"),
        other => other.into(),
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large("File exceeds maximum upload size")
    } else {
        ApiError::bad_request(format!("Invalid multipart data: {}", e.body_text()))
    }
}

fn file_to_response(file: &ArtifactRecord) -> FileResponse {
    FileResponse {
        id: file.id.clone(),
        filename: file.filename.clone(),
        file_type: file.file_type,
        origin: file.origin,
        byte_size: file.byte_size,
        storage_key: file.storage_key.clone(),
        uploaded_at: file.uploaded_at.to_rfc3339(),
        updated_at: file.updated_at.to_rfc3339(),
        user: file.owner_id.clone(),
        map_data: file.map_data.clone(),
    }
}

/// Where the uploaded bytes can be fetched: the public /uploads/ path when
/// enabled, otherwise the authenticated download route.
fn file_url(state: &AppState, headers: &HeaderMap, record: &ArtifactRecord) -> String {
    let base = state.config.server.public_base_url.clone().or_else(|| {
        headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(|host| format!("http://{host}"))
    });

    let path = if state.config.storage.public_uploads {
        format!("/uploads/{}", record.storage_key)
    } else {
        format!("/files/download/{}", record.id)
    };

    match base {
        Some(base) => format!("{base}{path}"),
        None => path,
    }
}
