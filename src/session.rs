use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppResult, error::ServiceError};

pub const PROFILE_ID: &str = "profile_id";
pub const CSRF_STATE: &str = "csrf_state";
pub const PKCE_VERIFIER: &str = "pkce_verifier";
pub const RETURN_URL: &str = "return_url";
pub const SIGNUP_ROLE: &str = "signup_role";

pub async fn current_profile(session: &Session) -> AppResult<Option<Uuid>> {
    Ok(session.get::<Uuid>(PROFILE_ID).await?)
}

pub async fn require_profile(session: &Session) -> AppResult<Uuid> {
    current_profile(session)
        .await?
        .ok_or_else(|| ServiceError::NotAuthenticated.into())
}
