use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::models::UserRecord;
use super::tables::*;

/// Canonical form used for the email uniqueness index and login lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Database {
    // ========================================================================
    // User operations
    // ========================================================================

    /// Store a new user. Fails with [`DatabaseError::Conflict`] when the username
    /// or the email is already registered; the check and the insert share one
    /// write transaction.
    pub fn insert_user(&self, user: &UserRecord) -> Result<(), DatabaseError> {
        debug_assert!(!user.id.is_empty(), "user id must not be empty");

        let email = normalize_email(&user.email);
        let write_txn = self.begin_write()?;
        {
            let mut usernames = write_txn.open_table(USERNAMES)?;
            let mut emails = write_txn.open_table(EMAILS)?;

            if usernames.get(user.username.as_str())?.is_some()
                || emails.get(email.as_str())?.is_some()
            {
                return Err(DatabaseError::Conflict(
                    "Username or email already exists".to_string(),
                ));
            }

            usernames.insert(user.username.as_str(), user.id.as_str())?;
            emails.insert(email.as_str(), user.id.as_str())?;

            let mut table = write_txn.open_table(USERS)?;
            let data = rmp_serde::to_vec_named(user)?;
            table.insert(user.id.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a user by UUID
    pub fn get_user(&self, id: &str) -> Result<Option<UserRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(USERS)?;

        match table.get(id)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// Get a user by email (resolves email -> uuid -> user)
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, DatabaseError> {
        let email = normalize_email(email);
        let read_txn = self.begin_read()?;
        let emails = read_txn.open_table(EMAILS)?;

        let id = match emails.get(email.as_str())? {
            Some(data) => data.value().to_string(),
            None => return Ok(None),
        };

        let users = read_txn.open_table(USERS)?;
        match users.get(id.as_str())? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }
}
