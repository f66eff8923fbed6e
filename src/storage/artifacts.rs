use std::collections::HashSet;

use redb::{ReadableTable, WriteTransaction};

use super::db::{add_to_index, Database, DatabaseError};
use super::models::ArtifactRecord;
use super::tables::*;

impl Database {
    // ========================================================================
    // Artifact operations
    // ========================================================================

    /// Store a new artifact record and index it by storage key and owner.
    /// Fails with [`DatabaseError::Conflict`] if another record already holds the key.
    pub fn insert_artifact(&self, artifact: &ArtifactRecord) -> Result<(), DatabaseError> {
        debug_assert!(!artifact.id.is_empty(), "artifact id must not be empty");
        debug_assert!(
            !artifact.storage_key.is_empty(),
            "artifact storage key must not be empty"
        );

        let write_txn = self.begin_write()?;
        claim_key(&write_txn, &artifact.storage_key, &artifact.id)?;
        {
            let mut table = write_txn.open_table(ARTIFACTS)?;
            let data = rmp_serde::to_vec_named(artifact)?;
            table.insert(artifact.id.as_str(), data.as_slice())?;
        }
        add_to_index(&write_txn, OWNER_ARTIFACTS, &artifact.owner_id, &artifact.id)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Overwrite an existing artifact record, moving its key index entry when the
    /// storage key changed. Returns `false` if the record does not exist.
    pub fn replace_artifact(&self, artifact: &ArtifactRecord) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;

        let previous_key: Option<String> = {
            let table = write_txn.open_table(ARTIFACTS)?;
            let result = match table.get(artifact.id.as_str())? {
                Some(data) => {
                    let existing: ArtifactRecord = rmp_serde::from_slice(data.value())?;
                    Some(existing.storage_key)
                }
                None => None,
            };
            result
        };

        let Some(previous_key) = previous_key else {
            return Ok(false);
        };

        if previous_key != artifact.storage_key {
            claim_key(&write_txn, &artifact.storage_key, &artifact.id)?;
            let mut keys = write_txn.open_table(ARTIFACT_KEYS)?;
            keys.remove(previous_key.as_str())?;
        }

        {
            let mut table = write_txn.open_table(ARTIFACTS)?;
            let data = rmp_serde::to_vec_named(artifact)?;
            table.insert(artifact.id.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(true)
    }

    /// Get an artifact by its UUID
    pub fn get_artifact(&self, id: &str) -> Result<Option<ArtifactRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ARTIFACTS)?;

        match table.get(id)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// Get an artifact by its storage key (resolves key -> uuid -> artifact)
    pub fn get_artifact_by_key(&self, key: &str) -> Result<Option<ArtifactRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let keys = read_txn.open_table(ARTIFACT_KEYS)?;

        let id = match keys.get(key)? {
            Some(data) => data.value().to_string(),
            None => return Ok(None),
        };

        let table = read_txn.open_table(ARTIFACTS)?;
        match table.get(id.as_str())? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// All artifacts owned by a user, newest first
    pub fn list_artifacts_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<ArtifactRecord>, DatabaseError> {
        let mut artifacts: Vec<ArtifactRecord> =
            self.list_owned(ARTIFACTS, OWNER_ARTIFACTS, owner_id)?;
        artifacts.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(artifacts)
    }

    /// Get all artifacts (for reconciliation)
    pub fn get_all_artifacts(&self) -> Result<Vec<ArtifactRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ARTIFACTS)?;

        let mut artifacts = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            artifacts.push(rmp_serde::from_slice(value.value())?);
        }
        Ok(artifacts)
    }

    /// Every storage key referenced by a record
    pub fn referenced_keys(&self) -> Result<HashSet<String>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ARTIFACT_KEYS)?;

        let mut keys = HashSet::new();
        for result in table.iter()? {
            let (key, _) = result?;
            keys.insert(key.value().to_string());
        }
        Ok(keys)
    }
}

/// Point `key` at artifact `id`, refusing if a different artifact holds it.
fn claim_key(write_txn: &WriteTransaction, key: &str, id: &str) -> Result<(), DatabaseError> {
    let mut keys = write_txn.open_table(ARTIFACT_KEYS)?;
    let holder = keys.get(key)?.map(|v| v.value().to_string());
    match holder {
        Some(holder) if holder != id => Err(DatabaseError::Conflict(format!(
            "storage key '{key}' is already in use"
        ))),
        _ => {
            keys.insert(key, id)?;
            Ok(())
        }
    }
}
