mod page;
mod query;

use axum::{routing::get, Router};

use crate::AppState;

pub use query::{search, DirectoryEntry, DirectoryFilter};

pub fn router() -> Router<AppState> {
    Router::new().route("/directory", get(page::directory))
}
