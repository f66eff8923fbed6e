//! geo-file-manager - backend API for user-owned geospatial files
//!
//! This crate provides:
//! - Registration, login and stateless bearer-token authentication
//! - Multipart upload of GeoJSON, KML and TIFF files
//! - Named GeoJSON maps saved, updated and renamed with file and metadata kept in sync
//! - Parsed retrieval (KML as an XML tree, everything else as JSON)
//! - redb embedded database for metadata, local content directory for file bytes

pub mod api;
pub mod artifacts;
pub mod auth;
pub mod config;
pub mod object_store;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use artifacts::KeyLocks;
use auth::{PasswordHasher, TokenIssuer};
use config::Config;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub object_store: Arc<dyn object_store::ObjectStore>,
    pub tokens: TokenIssuer,
    pub passwords: PasswordHasher,
    pub locks: KeyLocks,
}

impl AppState {
    pub fn new(
        config: Config,
        db: Database,
        object_store: Arc<dyn object_store::ObjectStore>,
    ) -> Self {
        let tokens = TokenIssuer::new(&config.auth.jwt_secret, config.auth.token_ttl_secs);
        let passwords = PasswordHasher::new(config.auth.password_iterations);

        Self {
            config,
            db,
            object_store,
            tokens,
            passwords,
            locks: KeyLocks::new(),
        }
    }
}
