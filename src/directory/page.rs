use axum::{debug_handler, extract::{Query, State}, response::{Html, IntoResponse, Response}};
use sqlx::SqlitePool;

use crate::{
    error::ServiceError,
    include_res,
    profiles::Role,
    res::{self, checked, escape},
    AppResult,
};

use super::query::{self, DirectoryEntry, DirectoryFilter};

fn field(value: &Option<String>) -> String {
    escape(value.as_deref().unwrap_or_default())
}

fn category_options(selected: Option<Role>) -> String {
    let mut options = format!(
        r#"<option value="all"{}>All professionals</option>"#,
        if selected.is_none() { " selected" } else { "" }
    );
    for role in Role::PROFESSIONAL {
        options += &format!(
            r#"<option value="{}"{}>{}</option>"#,
            role.as_str(),
            if selected == Some(role) { " selected" } else { "" },
            role.label()
        );
    }
    options
}

fn card(entry: &DirectoryEntry) -> String {
    let location = [entry.city.as_deref(), entry.state.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");

    include_res!(str, "/pages/directory/card.html")
        .replace("{slug}", &escape(entry.slug.as_deref().unwrap_or_default()))
        .replace("{name}", &escape(entry.full_name.as_deref().unwrap_or("Unnamed")))
        .replace("{role}", entry.role.label())
        .replace("{verified}", if entry.is_verified { r#"<span class="badge">Verified</span>"# } else { "" })
        .replace("{location}", &escape(&location))
        .replace("{languages}", &escape(&entry.languages().join(", ")))
        .replace("{bio}", &escape(entry.bio.as_deref().unwrap_or_default()))
}

#[debug_handler]
pub(crate) async fn directory(
    State(db_pool): State<SqlitePool>,
    Query(filter): Query<DirectoryFilter>,
) -> AppResult<Response> {
    let (role, results) = match filter.role() {
        Ok(role) => (role, query::search(&db_pool, &filter).await),
        Err(e) => (None, Err(e)),
    };

    let results = match results {
        Ok(entries) if entries.is_empty() => {
            r#"<p class="empty">No professionals found. Try widening your search.</p>"#.to_owned()
        }
        Ok(entries) => entries.iter().map(card).collect(),
        Err(ServiceError::Validation(message)) => {
            format!(r#"<p class="error">{}</p>"#, escape(&message))
        }
        Err(e) => return Err(e.into()),
    };

    let body = include_res!(str, "/pages/directory/directory.html")
        .replace("{categories}", &category_options(role))
        .replace("{q}", &field(&filter.q))
        .replace("{city}", &field(&filter.city))
        .replace("{state}", &field(&filter.state))
        .replace("{lang}", &field(&filter.lang))
        .replace("{verified}", checked(filter.verified_only()))
        .replace("{results}", &results);

    Ok(Html(res::page("Find a professional", &body)).into_response())
}
