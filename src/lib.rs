pub mod auth;
pub mod config;
pub mod conversations;
pub mod db;
pub mod directory;
pub mod error;
pub mod feed;
pub mod moderation;
pub mod pages;
pub mod policy;
pub mod profiles;
pub mod res;
pub mod session;

use std::{ops::Deref, sync::Arc};

use axum::{extract::FromRef, http::StatusCode, response::{Html, IntoResponse, Response}};
use oauth2::reqwest;
use serde_json::Value;
use sqlx::SqlitePool;

pub use error::ServiceError;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub clients: auth::Clients,
    pub feed: feed::Feed,
    pub policy: policy::SharedPolicy,
    pub config: Arc<config::Config>,
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn get_obj_field(&self, field: &str) -> AppResult<&Value>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in response"))?
            .as_str()
            .ok_or(format!("expected {field} in response to be string"))?
            .to_owned()
        )
    }

    fn get_obj_field(&self, field: &str) -> AppResult<&Value> {
        self.get(field)
        .ok_or(format!("expected {field} in response").into())
    }
}


pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0.downcast_ref::<ServiceError>() {
            Some(err @ ServiceError::Persistence(source)) => {
                tracing::error!(error = %source, "store failure");
                (err.status(), err.to_string())
            }
            Some(err) => {
                tracing::debug!(reason = %err, "request rejected");
                (err.status(), err.to_string())
            }
            None => {
                tracing::error!(error = ?self.0, "unhandled error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred.".to_owned(),
                )
            }
        };

        (status, Html(res::notice("Sorry", &message))).into_response()
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self(anyhow::Error::msg(err))
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self(anyhow::Error::msg(err.to_owned()))
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(anyhow::Error);
apperr_impl!(ServiceError);
apperr_impl!(serde_json::Error);
apperr_impl!(sqlx::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(axum::Error);
apperr_impl!(reqwest::Error);

impl<E: core::error::Error + Send + Sync + 'static, R: oauth2::ErrorResponse + Send + Sync + 'static> From<oauth2::RequestTokenError<E, R>> for AppError {
    fn from(err: oauth2::RequestTokenError<E, R>) -> Self {
        Self(anyhow::Error::from(err))
    }
}

/// Renders Markdown to an HTML response. Raw HTML in the source is escaped.
pub struct Markdown<T>(pub T);

impl<T> IntoResponse for Markdown<T>
where
    T: Deref<Target = str>
{
    fn into_response(self) -> axum::response::Response {
        use pulldown_cmark::{Event, Parser, Options};

        let parser = Parser::new_ext(&*self.0, Options::ENABLE_TABLES)
            .map(|event| match event {
            Event::Html(html) | Event::InlineHtml(html) => Event::Text(html),
            _ => event,
        });

        let mut body = String::new();
        pulldown_cmark::html::push_html(&mut body, parser);
        Html(res::page("MeroGhar", &body)).into_response()
    }
}
