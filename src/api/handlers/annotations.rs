use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::database_error;
use crate::api::auth::AuthUser;
use crate::api::response::{created, ApiError, AppJson};
use crate::storage::models::{MarkerRecord, ShapeRecord};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SaveShapeRequest {
    #[serde(default, rename = "shapeData")]
    pub shape_data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct AddMarkerRequest {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeResponse {
    pub id: String,
    pub user: String,
    pub shape_data: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerResponse {
    pub id: String,
    pub user: String,
    pub lat: f64,
    pub lng: f64,
    pub created_at: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn save_shape(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    AppJson(req): AppJson<SaveShapeRequest>,
) -> Result<(StatusCode, Json<ShapeResponse>), ApiError> {
    let shape_data = match req.shape_data {
        Some(data @ serde_json::Value::Object(_)) => data,
        _ => return Err(ApiError::bad_request("shapeData must be a JSON object")),
    };

    let now = Utc::now();
    let shape = ShapeRecord {
        id: uuid::Uuid::new_v4().to_string(),
        owner_id: caller.user_id,
        shape_data,
        created_at: now,
        updated_at: now,
    };
    state.db.insert_shape(&shape).map_err(database_error)?;

    tracing::debug!(shape_id = %shape.id, "Saved shape");
    Ok(created(shape_to_response(&shape)))
}

pub async fn list_shapes(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<Vec<ShapeResponse>>, ApiError> {
    let shapes = state
        .db
        .list_shapes(&caller.user_id)
        .map_err(database_error)?;

    Ok(Json(shapes.iter().map(shape_to_response).collect()))
}

pub async fn add_marker(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    AppJson(req): AppJson<AddMarkerRequest>,
) -> Result<(StatusCode, Json<MarkerResponse>), ApiError> {
    let (lat, lng) = match (req.lat, req.lng) {
        (Some(lat), Some(lng)) => (lat, lng),
        _ => return Err(ApiError::bad_request("lat and lng are required")),
    };
    if !(-90.0..=90.0).contains(&lat) {
        return Err(ApiError::bad_request("lat must be between -90 and 90"));
    }
    if !(-180.0..=180.0).contains(&lng) {
        return Err(ApiError::bad_request("lng must be between -180 and 180"));
    }

    let marker = MarkerRecord {
        id: uuid::Uuid::new_v4().to_string(),
        owner_id: caller.user_id,
        lat,
        lng,
        created_at: Utc::now(),
    };
    state.db.insert_marker(&marker).map_err(database_error)?;

    Ok(created(marker_to_response(&marker)))
}

pub async fn list_markers(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<Vec<MarkerResponse>>, ApiError> {
    let markers = state
        .db
        .list_markers(&caller.user_id)
        .map_err(database_error)?;

    Ok(Json(markers.iter().map(marker_to_response).collect()))
}

// ============================================================================
// Helpers
// ============================================================================

fn shape_to_response(shape: &ShapeRecord) -> ShapeResponse {
    ShapeResponse {
        id: shape.id.clone(),
        user: shape.owner_id.clone(),
        shape_data: shape.shape_data.clone(),
        created_at: shape.created_at.to_rfc3339(),
        updated_at: shape.updated_at.to_rfc3339(),
    }
}

fn marker_to_response(marker: &MarkerRecord) -> MarkerResponse {
    MarkerResponse {
        id: marker.id.clone(),
        user: marker.owner_id.clone(),
        lat: marker.lat,
        lng: marker.lng,
        created_at: marker.created_at.to_rfc3339(),
    }
}
