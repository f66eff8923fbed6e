//! File-plus-metadata synchronization.
//!
//! Every write follows the same contract: content goes to the object store
//! first (staged and renamed into place), the redb record commits last, and a
//! failed commit undoes the disk step. The metadata record is the source of
//! truth; [`reconcile`] removes content no record points at. Writes touching a
//! storage key hold that key's lock in [`KeyLocks`] for their whole duration.

mod ingest;
pub mod keys;
mod locks;
mod maps;
mod reader;
mod reconcile;

pub use ingest::{ingest_upload, Upload};
pub use locks::{KeyGuard, KeyLocks};
pub use maps::{save_map, update_map, MapUpdate};
pub use reader::{
    kml_to_json, parse_content, read_artifact, read_owned, read_owned_map, ParsedContent,
};
pub use reconcile::{reconcile, ReconcileStats};

use thiserror::Error;

use crate::object_store::ObjectStoreError;
use crate::storage::models::ArtifactRecord;
use crate::storage::DatabaseError;
use crate::AppState;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Duplicate(String),
    #[error("{context}: {source}")]
    Storage {
        context: &'static str,
        #[source]
        source: ObjectStoreError,
    },
    #[error("{context}: {detail}")]
    Parse {
        context: &'static str,
        detail: String,
    },
    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for ArtifactError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::Conflict(msg) => ArtifactError::Duplicate(msg),
            other => ArtifactError::Database(other),
        }
    }
}

impl ArtifactError {
    pub(crate) fn storage(context: &'static str) -> impl FnOnce(ObjectStoreError) -> Self {
        move |source| ArtifactError::Storage { context, source }
    }
}

/// Fetch a record the caller owns. Records owned by someone else are
/// indistinguishable from missing ones.
pub fn load_owned(
    state: &AppState,
    id: &str,
    owner_id: &str,
) -> Result<ArtifactRecord, ArtifactError> {
    match state.db.get_artifact(id)? {
        Some(record) if record.owner_id == owner_id => Ok(record),
        _ => Err(ArtifactError::NotFound("File not found".to_string())),
    }
}
