mod annotations;
mod files;
mod health;
mod static_files;
mod users;

use crate::api::response::ApiError;
use crate::artifacts::ArtifactError;
use crate::auth::AuthError;
use crate::storage::DatabaseError;

pub use annotations::{add_marker, list_markers, list_shapes, save_shape};
pub use files::{
    download_file, get_file, get_map, list_files, list_saved_maps, save_map, update_map,
    upload_file,
};
pub use health::health;
pub use static_files::serve_upload;
pub use users::{login, me, register};

/// Map a DatabaseError to an ApiError
fn database_error(e: DatabaseError) -> ApiError {
    match e {
        DatabaseError::Conflict(msg) => ApiError::bad_request(msg),
        other => {
            tracing::error!(error = %other, "Database operation failed");
            ApiError::internal(other.to_string())
        }
    }
}

impl From<ArtifactError> for ApiError {
    fn from(e: ArtifactError) -> Self {
        match e {
            ArtifactError::Validation(msg) | ArtifactError::Duplicate(msg) => {
                ApiError::bad_request(msg)
            }
            ArtifactError::NotFound(msg) => ApiError::not_found(msg),
            ArtifactError::Storage { context, source } => {
                tracing::error!(error = %source, "{context}");
                ApiError::internal(context)
            }
            ArtifactError::Parse { context, detail } => {
                tracing::warn!(error = %detail, "{context}");
                ApiError::internal(context)
            }
            ArtifactError::Database(e) => database_error(e),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        if e.is_client_error() {
            ApiError::unauthorized(e.to_string())
        } else {
            tracing::error!(error = %e, "Credential operation failed");
            ApiError::internal("Internal server error")
        }
    }
}
