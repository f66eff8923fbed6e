use bytes::Bytes;
use chrono::Utc;

use super::{keys, ArtifactError};
use crate::object_store::ObjectStore;
use crate::storage::models::{ArtifactOrigin, ArtifactRecord, FileType};
use crate::storage::DatabaseError;
use crate::AppState;

pub const UNSUPPORTED_FILE_TYPE: &str =
    "Unsupported file type. Only GeoJSON, KML, and TIFF files are allowed.";
pub const INVALID_DECLARED_TYPE: &str =
    "Invalid file type. Only GeoJSON, KML, and TIFF files are allowed.";

/// A file part received from a multipart upload
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub data: Bytes,
}

/// Validate an upload, store its bytes under a fresh key and record it.
///
/// If the record cannot be committed the stored blob is removed again.
pub async fn ingest_upload(
    state: &AppState,
    owner_id: &str,
    upload: Option<Upload>,
    declared_type: Option<&str>,
) -> Result<ArtifactRecord, ArtifactError> {
    let upload =
        upload.ok_or_else(|| ArtifactError::Validation("No file uploaded".to_string()))?;

    let ext = keys::allowed_extension(&upload.file_name)
        .ok_or_else(|| ArtifactError::Validation(UNSUPPORTED_FILE_TYPE.to_string()))?;

    let file_type: FileType = declared_type
        .map(str::trim)
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| ArtifactError::Validation(INVALID_DECLARED_TYPE.to_string()))?;

    if FileType::from_extension(&ext) != Some(file_type) {
        return Err(ArtifactError::Validation(format!(
            "File extension '.{ext}' does not match declared type {file_type}"
        )));
    }

    let key = keys::upload_key(&ext);
    let byte_size = upload.data.len() as u64;
    let _guard = state.locks.lock(&key).await;

    // Phase 1: content
    state
        .object_store
        .put(&key, upload.data)
        .await
        .map_err(ArtifactError::storage("Error saving file"))?;

    // Phase 2: metadata
    let now = Utc::now();
    let record = ArtifactRecord {
        id: uuid::Uuid::new_v4().to_string(),
        owner_id: owner_id.to_string(),
        filename: keys::display_name(&upload.file_name).to_string(),
        storage_key: key.clone(),
        file_type,
        origin: ArtifactOrigin::Upload,
        byte_size,
        map_data: None,
        uploaded_at: now,
        updated_at: now,
    };

    let committed = state.db.insert_artifact(&record);
    commit_or_discard(state.object_store.as_ref(), &key, committed).await?;

    tracing::debug!(
        artifact_id = %record.id,
        owner_id = %owner_id,
        storage_key = %key,
        file_type = %file_type,
        "Ingested upload"
    );
    Ok(record)
}

/// Remove the freshly stored blob when its record failed to commit.
async fn commit_or_discard(
    store: &dyn ObjectStore,
    key: &str,
    committed: Result<(), DatabaseError>,
) -> Result<(), ArtifactError> {
    let Err(e) = committed else {
        return Ok(());
    };
    if let Err(cleanup) = store.delete(key).await {
        tracing::error!(storage_key = %key, error = %cleanup, "Failed to remove blob after metadata write failed");
    }
    Err(e.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_state;

    fn upload(name: &str, body: &str) -> Option<Upload> {
        Some(Upload {
            file_name: name.to_string(),
            data: Bytes::from(body.to_string()),
        })
    }

    #[tokio::test]
    async fn test_ingest_stores_blob_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let record = ingest_upload(&state, "owner-1", upload("area.geojson", "{}"), Some("GeoJSON"))
            .await
            .unwrap();

        assert_eq!(record.owner_id, "owner-1");
        assert_eq!(record.filename, "area.geojson");
        assert_eq!(record.file_type, FileType::GeoJson);
        assert_eq!(record.byte_size, 2);
        assert!(record.storage_key.ends_with(".geojson"));
        assert!(state.object_store.exists(&record.storage_key).await.unwrap());

        let stored = state.db.get_artifact(&record.id).unwrap().unwrap();
        assert_eq!(stored, record);
    }

    #[tokio::test]
    async fn test_ingest_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let cases = [
            (None, Some("GeoJSON")),
            (upload("scan.bmp", "x"), Some("TIFF")),
            (upload("area.geojson", "{}"), None),
            (upload("area.geojson", "{}"), Some("Shapefile")),
            (upload("route.kml", "<kml/>"), Some("GeoJSON")),
        ];
        for (file, declared) in cases {
            let result = ingest_upload(&state, "owner-1", file, declared).await;
            assert!(matches!(result, Err(ArtifactError::Validation(_))));
        }

        assert!(state.object_store.list().await.unwrap().is_empty());
        assert!(state.db.list_artifacts_by_owner("owner-1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_extension_message() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let err = ingest_upload(&state, "o", upload("scan.bmp", "x"), Some("TIFF"))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Unsupported file type."));
    }

    #[tokio::test]
    async fn test_failed_record_commit_removes_blob() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let store = state.object_store.as_ref();
        let key = keys::upload_key("geojson");
        store.put(&key, Bytes::from_static(b"{}")).await.unwrap();

        let committed = Err(DatabaseError::Conflict("storage key taken".to_string()));
        let result = commit_or_discard(store, &key, committed).await;

        assert!(matches!(result, Err(ArtifactError::Duplicate(_))));
        assert!(!store.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_committed_record_keeps_blob() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let store = state.object_store.as_ref();
        let key = keys::upload_key("kml");
        store.put(&key, Bytes::from_static(b"<kml/>")).await.unwrap();

        commit_or_discard(store, &key, Ok(())).await.unwrap();
        assert!(store.exists(&key).await.unwrap());
    }
}
