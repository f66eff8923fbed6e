use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;

use super::{keys, load_owned, ArtifactError};
use crate::object_store::{ObjectStore, ObjectStoreError};
use crate::storage::models::{ArtifactOrigin, ArtifactRecord, FileType};
use crate::AppState;

const MAX_NAME_CHARS: usize = 255;

/// Optional changes applied by [`update_map`]
#[derive(Debug, Clone, Default)]
pub struct MapUpdate {
    pub map_data: Option<Value>,
    pub filename: Option<String>,
}

fn validate_name(name: Option<&str>) -> Result<&str, ArtifactError> {
    let name = name.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(ArtifactError::Validation("filename is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(ArtifactError::Validation(format!(
            "filename must be at most {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(name)
}

fn encode_payload(map_data: &Value) -> Result<Bytes, ArtifactError> {
    serde_json::to_vec(map_data)
        .map(Bytes::from)
        .map_err(|e| ArtifactError::Validation(format!("mapData is not serializable: {e}")))
}

/// Current bytes at `key`, or `None` if nothing is stored there yet.
async fn snapshot(store: &dyn ObjectStore, key: &str) -> Result<Option<Bytes>, ArtifactError> {
    match store.get(key).await {
        Ok(data) => Ok(Some(data)),
        Err(ObjectStoreError::NotFound(_)) => Ok(None),
        Err(source) => Err(ArtifactError::Storage {
            context: "Error reading map file",
            source,
        }),
    }
}

/// Disk steps already performed for a write, in a form that can be reverted.
#[derive(Default)]
struct DiskUndo {
    /// (key, bytes it held before) for an overwrite; `None` bytes means the key was empty
    overwritten: Option<(String, Option<Bytes>)>,
    /// (from, to) for a move
    moved: Option<(String, String)>,
}

impl DiskUndo {
    async fn revert(self, store: &dyn ObjectStore) {
        if let Some((key, previous)) = self.overwritten {
            let result = match previous {
                Some(data) => store.put(&key, data).await,
                None => store.delete(&key).await,
            };
            if let Err(e) = result {
                tracing::error!(storage_key = %key, error = %e, "Failed to restore map content during rollback");
            }
        }
        if let Some((from, to)) = self.moved {
            if let Err(e) = store.rename(&to, &from).await {
                tracing::error!(from = %to, to = %from, error = %e, "Failed to move map file back during rollback");
            }
        }
    }
}

/// Keep the disk changes if the record committed; otherwise undo them and
/// return the commit error.
async fn commit_or_revert<T>(
    store: &dyn ObjectStore,
    undo: DiskUndo,
    committed: Result<T, ArtifactError>,
) -> Result<T, ArtifactError> {
    match committed {
        Ok(value) => Ok(value),
        Err(e) => {
            undo.revert(store).await;
            Err(e)
        }
    }
}

/// Save a named GeoJSON map.
///
/// The file lives at a key derived from (owner, name). Saving a name the owner
/// already used overwrites that file and refreshes the existing record instead
/// of creating a second record for the same file.
pub async fn save_map(
    state: &AppState,
    owner_id: &str,
    filename: Option<&str>,
    map_data: Option<Value>,
) -> Result<ArtifactRecord, ArtifactError> {
    let name = validate_name(filename)?;
    let map_data = match map_data {
        Some(Value::Null) | None => {
            return Err(ArtifactError::Validation("mapData is required".to_string()))
        }
        Some(data) => data,
    };
    let payload = encode_payload(&map_data)?;
    let byte_size = payload.len() as u64;

    let key = keys::map_key(owner_id, name);
    let _guard = state.locks.lock(&key).await;
    let store = state.object_store.as_ref();

    let existing = state.db.get_artifact_by_key(&key)?;
    if let Some(ref record) = existing {
        if record.owner_id != owner_id {
            return Err(ArtifactError::Duplicate(
                "A map with this name already exists".to_string(),
            ));
        }
    }

    let previous = snapshot(store, &key).await?;
    store
        .put(&key, payload)
        .await
        .map_err(ArtifactError::storage("Error saving map"))?;
    let undo = DiskUndo {
        overwritten: Some((key.clone(), previous)),
        moved: None,
    };

    let now = Utc::now();
    let (record, committed) = match existing {
        Some(mut record) => {
            record.filename = name.to_string();
            record.map_data = Some(map_data);
            record.byte_size = byte_size;
            record.updated_at = now;
            let committed = state.db.replace_artifact(&record).map(|_| ());
            (record, committed)
        }
        None => {
            let record = ArtifactRecord {
                id: uuid::Uuid::new_v4().to_string(),
                owner_id: owner_id.to_string(),
                filename: name.to_string(),
                storage_key: key.clone(),
                file_type: FileType::GeoJson,
                origin: ArtifactOrigin::Saved,
                byte_size,
                map_data: Some(map_data),
                uploaded_at: now,
                updated_at: now,
            };
            let committed = state.db.insert_artifact(&record);
            (record, committed)
        }
    };

    commit_or_revert(store, undo, committed.map_err(ArtifactError::from)).await?;

    tracing::debug!(artifact_id = %record.id, owner_id = %owner_id, storage_key = %key, "Saved map");
    Ok(record)
}

/// Update a map's content and/or name.
///
/// Disk changes happen first; the record is committed last, and any failure
/// reverts the disk changes made so far so the record and the file never
/// disagree.
pub async fn update_map(
    state: &AppState,
    owner_id: &str,
    id: &str,
    update: MapUpdate,
) -> Result<ArtifactRecord, ArtifactError> {
    if update.map_data.is_none() && update.filename.is_none() {
        return Err(ArtifactError::Validation(
            "at least one field (mapData, filename) must be provided".to_string(),
        ));
    }
    if matches!(update.map_data, Some(Value::Null)) {
        return Err(ArtifactError::Validation("mapData must not be null".to_string()));
    }
    let new_name = match update.filename.as_deref() {
        Some(name) => Some(validate_name(Some(name))?),
        None => None,
    };

    loop {
        let record = load_owned(state, id, owner_id)?;
        if record.file_type != FileType::GeoJson {
            return Err(ArtifactError::Validation(
                "Only GeoJSON maps can be updated".to_string(),
            ));
        }

        let target_key = new_name
            .filter(|name| *name != record.filename)
            .map(|name| keys::map_key(owner_id, name))
            .filter(|key| *key != record.storage_key);

        let mut lock_keys = vec![record.storage_key.as_str()];
        if let Some(ref key) = target_key {
            lock_keys.push(key.as_str());
        }
        let guard = state.locks.lock_all(&lock_keys).await;

        // A concurrent rename may have moved the record while we waited
        let current = load_owned(state, id, owner_id)?;
        if current.storage_key != record.storage_key || current.filename != record.filename {
            drop(guard);
            continue;
        }

        let result = apply_update(state, current, update.map_data, new_name, target_key).await;
        drop(guard);
        return result;
    }
}

async fn apply_update(
    state: &AppState,
    current: ArtifactRecord,
    map_data: Option<Value>,
    new_name: Option<&str>,
    target_key: Option<String>,
) -> Result<ArtifactRecord, ArtifactError> {
    let store = state.object_store.as_ref();
    let mut updated = current.clone();
    let mut undo = DiskUndo::default();

    if let Some(name) = new_name {
        updated.filename = name.to_string();
    }

    if let Some(to) = target_key {
        if let Some(holder) = state.db.get_artifact_by_key(&to)? {
            if holder.id != current.id {
                return Err(ArtifactError::Duplicate(format!(
                    "A map named '{}' already exists",
                    updated.filename
                )));
            }
        }

        store
            .rename(&current.storage_key, &to)
            .await
            .map_err(ArtifactError::storage("Error renaming map file"))?;
        undo.moved = Some((current.storage_key.clone(), to.clone()));
        updated.storage_key = to;
    }

    if let Some(data) = map_data {
        let written = async {
            let payload = encode_payload(&data)?;
            let previous = snapshot(store, &updated.storage_key).await?;
            let byte_size = payload.len() as u64;
            store
                .put(&updated.storage_key, payload)
                .await
                .map_err(ArtifactError::storage("Error saving map"))?;
            Ok::<_, ArtifactError>((previous, byte_size))
        }
        .await;

        match written {
            Ok((previous, byte_size)) => {
                undo.overwritten = Some((updated.storage_key.clone(), previous));
                updated.byte_size = byte_size;
                updated.map_data = Some(data);
            }
            Err(e) => {
                undo.revert(store).await;
                return Err(e);
            }
        }
    }

    updated.updated_at = Utc::now();

    let committed = match state.db.replace_artifact(&updated) {
        Ok(true) => Ok(()),
        Ok(false) => Err(ArtifactError::NotFound("Map not found".to_string())),
        Err(e) => Err(e.into()),
    };
    commit_or_revert(store, undo, committed).await?;

    tracing::debug!(
        artifact_id = %updated.id,
        storage_key = %updated.storage_key,
        renamed = current.storage_key != updated.storage_key,
        "Updated map"
    );
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DatabaseError;
    use crate::testutil::test_state;
    use serde_json::json;

    fn collection(name: &str) -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "name": name },
                "geometry": { "type": "Point", "coordinates": [13.4, 52.5] }
            }]
        })
    }

    async fn disk_json(state: &AppState, key: &str) -> Value {
        let bytes = state.object_store.get(key).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_save_writes_file_and_inline_payload() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let payload = collection("a");

        let record = save_map(&state, "u1", Some("Parks"), Some(payload.clone()))
            .await
            .unwrap();

        assert_eq!(record.filename, "Parks");
        assert_eq!(record.file_type, FileType::GeoJson);
        assert_eq!(record.origin, ArtifactOrigin::Saved);
        assert_eq!(record.map_data.as_ref(), Some(&payload));
        assert_eq!(record.storage_key, keys::map_key("u1", "Parks"));
        assert_eq!(disk_json(&state, &record.storage_key).await, payload);
    }

    #[tokio::test]
    async fn test_save_requires_name_and_payload() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        for (name, data) in [
            (None, Some(collection("a"))),
            (Some("   "), Some(collection("a"))),
            (Some("ok"), None),
            (Some("ok"), Some(Value::Null)),
        ] {
            let result = save_map(&state, "u1", name, data).await;
            assert!(matches!(result, Err(ArtifactError::Validation(_))));
        }
        assert!(state.object_store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resave_same_name_reuses_record() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let first = save_map(&state, "u1", Some("Parks"), Some(collection("a")))
            .await
            .unwrap();
        let second = save_map(&state, "u1", Some("Parks"), Some(collection("b")))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(state.db.list_artifacts_by_owner("u1").unwrap().len(), 1);
        assert_eq!(disk_json(&state, &second.storage_key).await, collection("b"));
    }

    #[tokio::test]
    async fn test_same_name_different_owners_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let a = save_map(&state, "u1", Some("Parks"), Some(collection("a")))
            .await
            .unwrap();
        let b = save_map(&state, "u2", Some("Parks"), Some(collection("b")))
            .await
            .unwrap();

        assert_ne!(a.storage_key, b.storage_key);
        assert_eq!(disk_json(&state, &a.storage_key).await, collection("a"));
    }

    #[tokio::test]
    async fn test_rename_moves_file_and_keeps_payload() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let saved = save_map(&state, "u1", Some("Old"), Some(collection("a")))
            .await
            .unwrap();

        let updated = update_map(
            &state,
            "u1",
            &saved.id,
            MapUpdate {
                filename: Some("New".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.filename, "New");
        assert_eq!(updated.storage_key, keys::map_key("u1", "New"));
        assert_eq!(updated.map_data, saved.map_data);
        assert!(!state.object_store.exists(&saved.storage_key).await.unwrap());
        assert_eq!(disk_json(&state, &updated.storage_key).await, collection("a"));
        assert!(state.db.get_artifact_by_key(&saved.storage_key).unwrap().is_none());
        assert_eq!(
            state.db.get_artifact_by_key(&updated.storage_key).unwrap().unwrap().id,
            saved.id
        );
    }

    #[tokio::test]
    async fn test_payload_update_keeps_name() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let saved = save_map(&state, "u1", Some("Keep"), Some(collection("a")))
            .await
            .unwrap();

        let updated = update_map(
            &state,
            "u1",
            &saved.id,
            MapUpdate {
                map_data: Some(collection("b")),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.filename, "Keep");
        assert_eq!(updated.storage_key, saved.storage_key);
        assert_eq!(updated.map_data, Some(collection("b")));
        assert_eq!(disk_json(&state, &saved.storage_key).await, collection("b"));
    }

    #[tokio::test]
    async fn test_rename_and_payload_together() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let saved = save_map(&state, "u1", Some("One"), Some(collection("a")))
            .await
            .unwrap();

        let updated = update_map(
            &state,
            "u1",
            &saved.id,
            MapUpdate {
                map_data: Some(collection("b")),
                filename: Some("Two".to_string()),
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.filename, "Two");
        assert_eq!(disk_json(&state, &updated.storage_key).await, collection("b"));
        assert!(!state.object_store.exists(&saved.storage_key).await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_onto_existing_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let a = save_map(&state, "u1", Some("A"), Some(collection("a")))
            .await
            .unwrap();
        let b = save_map(&state, "u1", Some("B"), Some(collection("b")))
            .await
            .unwrap();

        let result = update_map(
            &state,
            "u1",
            &a.id,
            MapUpdate {
                filename: Some("B".to_string()),
                ..Default::default()
            },
        )
        .await;

        assert!(matches!(result, Err(ArtifactError::Duplicate(_))));
        assert_eq!(disk_json(&state, &a.storage_key).await, collection("a"));
        assert_eq!(disk_json(&state, &b.storage_key).await, collection("b"));
    }

    #[tokio::test]
    async fn test_failed_rename_leaves_record_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let saved = save_map(&state, "u1", Some("Lost"), Some(collection("a")))
            .await
            .unwrap();

        // Content vanished behind our back: the move fails, the record must not change
        state.object_store.delete(&saved.storage_key).await.unwrap();
        let result = update_map(
            &state,
            "u1",
            &saved.id,
            MapUpdate {
                filename: Some("Found".to_string()),
                ..Default::default()
            },
        )
        .await;

        assert!(matches!(result, Err(ArtifactError::Storage { .. })));
        let record = state.db.get_artifact(&saved.id).unwrap().unwrap();
        assert_eq!(record.filename, "Lost");
        assert_eq!(record.storage_key, saved.storage_key);
    }

    fn commit_failure() -> Result<(), ArtifactError> {
        Err(DatabaseError::Conflict("key taken".to_string()).into())
    }

    #[tokio::test]
    async fn test_failed_commit_restores_previous_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let store = state.object_store.as_ref();
        let key = keys::map_key("u1", "Parks");
        store.put(&key, Bytes::from_static(b"old")).await.unwrap();

        let previous = snapshot(store, &key).await.unwrap();
        store.put(&key, Bytes::from_static(b"new")).await.unwrap();
        let undo = DiskUndo {
            overwritten: Some((key.clone(), previous)),
            moved: None,
        };

        let result = commit_or_revert(store, undo, commit_failure()).await;
        assert!(matches!(result, Err(ArtifactError::Duplicate(_))));
        assert_eq!(store.get(&key).await.unwrap(), Bytes::from_static(b"old"));
    }

    #[tokio::test]
    async fn test_failed_commit_removes_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let store = state.object_store.as_ref();
        let key = keys::map_key("u1", "Fresh");

        let previous = snapshot(store, &key).await.unwrap();
        assert!(previous.is_none());
        store.put(&key, Bytes::from_static(b"{}")).await.unwrap();
        let undo = DiskUndo {
            overwritten: Some((key.clone(), previous)),
            moved: None,
        };

        assert!(commit_or_revert(store, undo, commit_failure()).await.is_err());
        assert!(!store.exists(&key).await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_commit_moves_renamed_file_back() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let store = state.object_store.as_ref();
        let old_key = keys::map_key("u1", "Before");
        let new_key = keys::map_key("u1", "After");
        store.put(&old_key, Bytes::from_static(b"old")).await.unwrap();

        // Same disk steps as a rename plus payload update
        store.rename(&old_key, &new_key).await.unwrap();
        let previous = snapshot(store, &new_key).await.unwrap();
        store.put(&new_key, Bytes::from_static(b"new")).await.unwrap();
        let undo = DiskUndo {
            overwritten: Some((new_key.clone(), previous)),
            moved: Some((old_key.clone(), new_key.clone())),
        };

        assert!(commit_or_revert(store, undo, commit_failure()).await.is_err());
        assert_eq!(store.get(&old_key).await.unwrap(), Bytes::from_static(b"old"));
        assert!(!store.exists(&new_key).await.unwrap());
    }

    #[tokio::test]
    async fn test_successful_commit_keeps_disk_changes() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let store = state.object_store.as_ref();
        let key = keys::map_key("u1", "Kept");
        store.put(&key, Bytes::from_static(b"new")).await.unwrap();
        let undo = DiskUndo {
            overwritten: Some((key.clone(), None)),
            moved: None,
        };

        commit_or_revert(store, undo, Ok(())).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Bytes::from_static(b"new"));
    }

    #[tokio::test]
    async fn test_update_checks_owner_and_type() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let saved = save_map(&state, "u1", Some("Mine"), Some(collection("a")))
            .await
            .unwrap();

        let stolen = update_map(
            &state,
            "u2",
            &saved.id,
            MapUpdate {
                filename: Some("Theirs".to_string()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(stolen, Err(ArtifactError::NotFound(_))));

        let empty = update_map(&state, "u1", &saved.id, MapUpdate::default()).await;
        assert!(matches!(empty, Err(ArtifactError::Validation(_))));

        let missing = update_map(
            &state,
            "u1",
            "no-such-id",
            MapUpdate {
                map_data: Some(collection("x")),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(missing, Err(ArtifactError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_updates_keep_file_and_record_in_sync() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let saved = save_map(&state, "u1", Some("Race"), Some(collection("start")))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let state = std::sync::Arc::clone(&state);
            let id = saved.id.clone();
            handles.push(tokio::spawn(async move {
                update_map(
                    &state,
                    "u1",
                    &id,
                    MapUpdate {
                        map_data: Some(collection(&format!("writer-{i}"))),
                        filename: Some(format!("Race {}", i % 3)),
                    },
                )
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let record = state.db.get_artifact(&saved.id).unwrap().unwrap();
        let on_disk = disk_json(&state, &record.storage_key).await;
        assert_eq!(record.map_data.as_ref(), Some(&on_disk));
        assert_eq!(record.storage_key, keys::map_key("u1", &record.filename));
        assert_eq!(state.object_store.list().await.unwrap(), vec![record.storage_key]);
    }
}
