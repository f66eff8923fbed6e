use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    /// Maximum upload (and JSON body) size in bytes
    pub max_upload_size: u64,
    /// Sweep orphaned content files before serving
    pub reconcile_on_startup: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Base used to build `fileUrl` values; falls back to the request Host header.
    pub public_base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path of the redb metadata database
    pub database_path: String,
    /// Content directory holding uploaded and saved files
    pub upload_dir: String,
    /// Serve content files unauthenticated under /uploads/
    pub public_uploads: bool,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub password_iterations: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            public_base_url: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./data/geo-file-manager.redb".to_string(),
            upload_dir: "./uploads".to_string(),
            public_uploads: true,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: 3600,
            password_iterations: 100_000,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address = match std::env::var("BIND_ADDRESS") {
            Ok(addr) => addr,
            Err(_) => {
                let port: u16 = env_parse("PORT").unwrap_or(5000);
                format!("0.0.0.0:{port}")
            }
        };

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .ok()
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());

        let database_path = std::env::var("DATABASE_URL")
            .map(|url| {
                url.strip_prefix("redb://")
                    .map(str::to_string)
                    .unwrap_or(url)
            })
            .unwrap_or_else(|_| StorageConfig::default().database_path);

        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string());

        let config = Config {
            server: ServerConfig {
                bind_address,
                public_base_url,
            },
            storage: StorageConfig {
                database_path,
                upload_dir,
                public_uploads: env_flag("PUBLIC_UPLOADS", true),
            },
            auth: AuthConfig {
                jwt_secret: std::env::var("JWT_SECRET").unwrap_or_default(),
                token_ttl_secs: env_parse("TOKEN_TTL_SECS").unwrap_or(3600),
                password_iterations: env_parse("PASSWORD_ITERATIONS").unwrap_or(100_000),
            },
            max_upload_size: env_parse("MAX_UPLOAD_SIZE").unwrap_or(50 * 1024 * 1024), // 50MB
            reconcile_on_startup: env_flag("RECONCILE_ON_STARTUP", true),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "JWT_SECRET must be set".to_string(),
            ));
        }

        if self.auth.token_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "TOKEN_TTL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.auth.password_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "PASSWORD_ITERATIONS must be at least 1".to_string(),
            ));
        }

        if self.storage.database_path.is_empty() {
            return Err(ConfigError::ValidationError(
                "DATABASE_URL cannot be empty".to_string(),
            ));
        }

        // Reconcile deletes files in the content directory
        if lexical_absolute(&self.storage.database_path)
            .starts_with(lexical_absolute(&self.storage.upload_dir))
        {
            return Err(ConfigError::ValidationError(
                "DATABASE_URL must not point inside UPLOAD_DIR".to_string(),
            ));
        }

        if self.auth.jwt_secret.len() < 32 {
            tracing::warn!(
                "JWT_SECRET is shorter than 32 bytes. Consider using a longer random secret."
            );
        }

        Ok(())
    }
}

/// Absolute form of `path` with `.` and `..` folded, without touching the
/// filesystem (neither path needs to exist yet).
fn lexical_absolute(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
