use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppResult, PortalError};

pub const USER_ID: &str = "user_id";

pub async fn require_user_id(session: &Session) -> AppResult<Uuid> {
    session
        .get::<Uuid>(USER_ID)
        .await?
        .ok_or(PortalError::Unauthenticated)
}
