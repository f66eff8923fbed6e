mod annotations;
mod artifacts;
pub mod db;
pub mod models;
mod tables;
mod users;

pub use db::{Database, DatabaseError};
pub use tables::*;
pub use users::normalize_email;
