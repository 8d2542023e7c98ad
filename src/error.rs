//! Rejection reasons shared by every operation.
//!
//! Each variant is terminal for the request that produced it; nothing here
//! is retried. [`crate::AppError`] maps them onto HTTP status codes.

use axum::http::StatusCode;
use thiserror::Error;

use crate::moderation::ReportStatus;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Error, Debug)]
pub enum ServiceError {
    // validation
    #[error("{0}")]
    Validation(String),

    #[error("Message cannot be empty.")]
    EmptyContent,

    // authorization
    #[error("You must be logged in to do that.")]
    NotAuthenticated,

    #[error("You cannot message yourself.")]
    SelfTarget,

    #[error("You cannot block yourself.")]
    SelfBlock,

    #[error("You cannot report yourself.")]
    SelfReport,

    /// Same wording whether or not a block exists on the other side.
    #[error("You cannot message this user.")]
    Blocked,

    #[error("You do not have access to this.")]
    Forbidden,

    #[error("{0} not found.")]
    NotFound(&'static str),

    #[error("This report has already been {0}.")]
    AlreadyReviewed(ReportStatus),

    // persistence
    #[error("Something went wrong. Please try again later.")]
    Persistence(#[from] sqlx::Error),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        use ServiceError::*;
        match self {
            Validation(_) | EmptyContent => StatusCode::BAD_REQUEST,
            NotAuthenticated => StatusCode::UNAUTHORIZED,
            SelfTarget | SelfBlock | SelfReport | Blocked | Forbidden => StatusCode::FORBIDDEN,
            NotFound(_) => StatusCode::NOT_FOUND,
            AlreadyReviewed(_) => StatusCode::CONFLICT,
            Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_message_does_not_mention_blocking() {
        let msg = ServiceError::Blocked.to_string();
        assert!(!msg.to_lowercase().contains("block"));
    }

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(ServiceError::EmptyContent.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ServiceError::NotAuthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ServiceError::SelfBlock.status(), StatusCode::FORBIDDEN);
        assert_eq!(ServiceError::NotFound("profile").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ServiceError::AlreadyReviewed(ReportStatus::Resolved).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::Persistence(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
