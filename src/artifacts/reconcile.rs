use super::{keys, ArtifactError};
use crate::AppState;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Content files no record referenced, now deleted
    pub orphans_removed: u64,
    /// Leftovers from interrupted writes, now deleted
    pub staging_cleared: u64,
    /// Records whose content file is gone (reported, not modified)
    pub missing_content: u64,
    /// Unreferenced files this service did not name, left in place
    pub foreign_skipped: u64,
}

/// Bring the content directory back in line with the metadata store.
///
/// Records are authoritative: a file without a record is deleted, a record
/// without a file is only reported. Only files named like generated storage
/// keys are candidates. Each candidate is re-checked under its key lock so
/// in-flight writes are never swept.
pub async fn reconcile(state: &AppState) -> Result<ReconcileStats, ArtifactError> {
    let mut stats = ReconcileStats::default();
    let store = state.object_store.as_ref();

    stats.staging_cleared = store
        .clear_staging()
        .await
        .map_err(ArtifactError::storage("Error clearing staging area"))?;

    let stored = store
        .list()
        .await
        .map_err(ArtifactError::storage("Error listing content directory"))?;
    let referenced = state.db.referenced_keys()?;

    for key in stored.iter().filter(|k| !referenced.contains(*k)) {
        if !keys::is_generated_key(key) {
            tracing::debug!(file = %key, "Leaving unrecognized file in content directory");
            stats.foreign_skipped += 1;
            continue;
        }
        let _guard = state.locks.lock(key).await;
        if state.db.get_artifact_by_key(key)?.is_some() {
            continue;
        }
        match store.delete(key).await {
            Ok(()) => {
                tracing::info!(storage_key = %key, "Removed orphaned content file");
                stats.orphans_removed += 1;
            }
            Err(e) => {
                tracing::warn!(storage_key = %key, error = %e, "Failed to remove orphaned content file");
            }
        }
    }

    for record in state.db.get_all_artifacts()? {
        let present = store
            .exists(&record.storage_key)
            .await
            .map_err(ArtifactError::storage("Error checking content file"))?;
        if !present {
            tracing::warn!(
                artifact_id = %record.id,
                storage_key = %record.storage_key,
                "Record references missing content file"
            );
            stats.missing_content += 1;
        }
    }

    Ok(stats)
}
