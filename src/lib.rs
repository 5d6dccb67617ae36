pub mod announcements;
pub mod appointments;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod messaging;
pub mod notifications;
pub mod realtime;
pub mod session;
pub mod todos;
pub mod users;

#[cfg(test)]
pub(crate) mod testutil;

use axum::extract::FromRef;
use sqlx::SqlitePool;

pub use error::{AppResult, PortalError};
pub use realtime::Presence;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub presence: Presence,
}
