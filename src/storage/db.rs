use redb::{Database as RedbDatabase, ReadTransaction, ReadableTable, WriteTransaction};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::tables::*;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(Box<redb::CommitError>),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Redb(Box<redb::Error>),
    #[error("Database error: {0}")]
    RedbDatabase(Box<redb::DatabaseError>),
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
    #[error("Storage error: {0}")]
    Storage(Box<redb::StorageError>),
    #[error("Table error: {0}")]
    Table(Box<redb::TableError>),
    #[error("Transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
}

impl From<redb::CommitError> for DatabaseError {
    fn from(e: redb::CommitError) -> Self {
        DatabaseError::Commit(Box::new(e))
    }
}

impl From<redb::DatabaseError> for DatabaseError {
    fn from(e: redb::DatabaseError) -> Self {
        DatabaseError::RedbDatabase(Box::new(e))
    }
}

impl From<redb::Error> for DatabaseError {
    fn from(e: redb::Error) -> Self {
        DatabaseError::Redb(Box::new(e))
    }
}

impl From<redb::StorageError> for DatabaseError {
    fn from(e: redb::StorageError) -> Self {
        DatabaseError::Storage(Box::new(e))
    }
}

impl From<redb::TableError> for DatabaseError {
    fn from(e: redb::TableError) -> Self {
        DatabaseError::Table(Box::new(e))
    }
}

impl From<redb::TransactionError> for DatabaseError {
    fn from(e: redb::TransactionError) -> Self {
        DatabaseError::Transaction(Box::new(e))
    }
}

pub struct Database {
    db: Arc<RedbDatabase>,
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

impl Database {
    /// Open or create the database file at `path`, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Arc::new(RedbDatabase::create(path.as_ref())?);

        // Initialize application tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERNAMES)?;
            let _ = write_txn.open_table(EMAILS)?;
            let _ = write_txn.open_table(ARTIFACTS)?;
            let _ = write_txn.open_table(ARTIFACT_KEYS)?;
            let _ = write_txn.open_table(OWNER_ARTIFACTS)?;
            let _ = write_txn.open_table(SHAPES)?;
            let _ = write_txn.open_table(OWNER_SHAPES)?;
            let _ = write_txn.open_table(MARKERS)?;
            let _ = write_txn.open_table(OWNER_MARKERS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Begin a read transaction
    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }

    // ========================================================================
    // Owner-indexed records
    // ========================================================================

    /// Insert a msgpack record and append its id to the owner's index in one transaction.
    pub(crate) fn insert_owned(
        &self,
        records: BlobTable,
        index: BlobTable,
        id: &str,
        owner_id: &str,
        data: &[u8],
    ) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(records)?;
            table.insert(id, data)?;
        }
        add_to_index(&write_txn, index, owner_id, id)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Load every record listed under `owner_id` in `index`.
    pub(crate) fn list_owned<T: DeserializeOwned>(
        &self,
        records: BlobTable,
        index: BlobTable,
        owner_id: &str,
    ) -> Result<Vec<T>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let index_table = read_txn.open_table(index)?;
        let records_table = read_txn.open_table(records)?;

        let ids: Vec<String> = match index_table.get(owner_id)? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => return Ok(Vec::new()),
        };

        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(data) = records_table.get(id.as_str())? {
                items.push(rmp_serde::from_slice(data.value())?);
            }
        }
        Ok(items)
    }
}

/// Append `id` to the msgpack id list stored under `owner_id`.
pub(crate) fn add_to_index(
    write_txn: &WriteTransaction,
    index: BlobTable,
    owner_id: &str,
    id: &str,
) -> Result<(), DatabaseError> {
    let mut table = write_txn.open_table(index)?;
    let mut ids: Vec<String> = match table.get(owner_id)? {
        Some(data) => rmp_serde::from_slice(data.value())?,
        None => Vec::new(),
    };

    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
        let data = rmp_serde::to_vec_named(&ids)?;
        table.insert(owner_id, data.as_slice())?;
    }
    Ok(())
}
