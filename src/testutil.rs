//! Shared test helpers for unit tests.

use std::sync::Arc;

use crate::config::{AuthConfig, Config, ServerConfig, StorageConfig};
use crate::object_store::LocalStore;
use crate::storage::Database;
use crate::AppState;

pub const TEST_SECRET: &str = "test-secret-key-for-token-signing";

/// Create a test AppState with a temporary database and local object store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let db_path = temp_dir.path().join("data").join("test.redb");
    let files_dir = temp_dir.path().join("files");

    let config = Config {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            public_base_url: None,
        },
        storage: StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            upload_dir: files_dir.to_string_lossy().to_string(),
            public_uploads: true,
        },
        auth: AuthConfig {
            jwt_secret: TEST_SECRET.to_string(),
            token_ttl_secs: 3600,
            // Keep hashing cheap in tests
            password_iterations: 1_000,
        },
        max_upload_size: 10 * 1024 * 1024, // 10MB for tests
        reconcile_on_startup: false,
    };

    let db = Database::open(&db_path).expect("Failed to open test database");
    let object_store = LocalStore::new(&files_dir).expect("Failed to create test object store");

    Arc::new(AppState::new(config, db, Arc::new(object_store)))
}
