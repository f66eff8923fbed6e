//! Credentials: password hashing and stateless bearer tokens.

pub mod password;
pub mod tokens;

pub use password::PasswordHasher;
pub use tokens::{Claims, TokenIssuer};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Access denied. No token provided.")]
    MissingToken,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Token expired")]
    Expired,
    #[error("Token encoding failed: {0}")]
    Encoding(String),
    #[error("Password hashing failed")]
    Hashing,
}

impl AuthError {
    /// True for failures caused by the presented credential rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AuthError::MissingToken | AuthError::InvalidToken(_) | AuthError::Expired
        )
    }
}
