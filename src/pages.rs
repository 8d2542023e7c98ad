//! Site pages that don't belong to a feature module.

use std::sync::Arc;

use axum::{
    debug_handler,
    extract::State,
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    config::Config,
    conversations, directory,
    error::ServiceError,
    include_res, moderation,
    profiles::{self, Role},
    res::{self, escape},
    session::{self, SIGNUP_ROLE},
    AppResult, AppState, Markdown,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/dashboard", get(dashboard))
        .route("/signup", get(signup_page).post(signup))
        .route("/terms", get(terms))
        .route("/privacy", get(privacy))
        .route("/disclaimer", get(disclaimer))
        .route("/sitemap.xml", get(sitemap))
}

#[debug_handler]
async fn home() -> Html<String> {
    let mut categories = String::new();
    for role in Role::PROFESSIONAL {
        categories += &format!(
            r#"<li><a href="/directory?category={}">{}s</a></li>"#,
            role.as_str(),
            role.label()
        );
    }
    Html(res::page(
        "MeroGhar",
        &include_res!(str, "/pages/index.html").replace("{categories}", &categories),
    ))
}

#[debug_handler]
async fn dashboard(State(db_pool): State<SqlitePool>, session: Session) -> AppResult<Response> {
    let Some(profile_id) = session::current_profile(&session).await? else {
        return Ok(Redirect::to("/login?return_url=/dashboard").into_response());
    };
    let Some(profile) = profiles::get(&db_pool, profile_id).await? else {
        // profile vanished underneath the session
        session.flush().await?;
        return Ok(Redirect::to("/login").into_response());
    };

    let conversations = conversations::summaries(&db_pool, profile_id).await?.len();

    let mut links = String::from(r#"<li><a href="/messages">Messages</a></li>"#);
    if profile.role.is_professional() {
        if let Some(slug) = &profile.slug {
            links += &format!(r#"<li><a href="/pro/{0}">View public profile</a></li>"#, escape(slug));
        }
        links += r#"<li><a href="/dashboard/profile">Edit profile</a></li>"#;
    } else {
        links += r#"<li><a href="/directory">Find a professional</a></li>"#;
    }
    if profile.role == Role::Admin {
        let pending = moderation::report::pending_count(&db_pool).await?;
        links += &format!(r#"<li><a href="/admin">Moderation ({pending} pending)</a></li>"#);
    }

    let body = include_res!(str, "/pages/dashboard.html")
        .replace("{name}", &escape(profile.display_name()))
        .replace("{role}", profile.role.label())
        .replace("{verified}", if profile.is_verified { r#"<span class="badge">Verified</span>"# } else { "" })
        .replace("{conversations}", &conversations.to_string())
        .replace("{links}", &links);

    Ok(Html(res::page("Dashboard", &body)).into_response())
}

#[debug_handler]
async fn signup_page() -> Html<String> {
    let mut choices = format!(
        r#"<button name="role" value="{}">I'm looking for a home</button>"#,
        Role::Customer.as_str()
    );
    for role in Role::PROFESSIONAL {
        choices += &format!(
            r#"<button name="role" value="{}">I'm a {}</button>"#,
            role.as_str(),
            role.label()
        );
    }
    Html(res::page(
        "Sign up",
        &include_res!(str, "/pages/auth/signup.html").replace("{choices}", &choices),
    ))
}

#[derive(Deserialize)]
struct SignupForm {
    role: Role,
}

/// Remembers the chosen role for the profile the next login creates.
#[debug_handler]
async fn signup(session: Session, Form(SignupForm { role }): Form<SignupForm>) -> AppResult<Redirect> {
    if role == Role::Admin {
        return Err(ServiceError::validation("Admin accounts cannot be created at signup.").into());
    }
    session.insert(SIGNUP_ROLE, role).await?;
    Ok(Redirect::to("/login"))
}

#[debug_handler]
async fn terms() -> impl IntoResponse {
    Markdown(include_res!(str, "/pages/legal/terms.md"))
}

#[debug_handler]
async fn privacy() -> impl IntoResponse {
    Markdown(include_res!(str, "/pages/legal/privacy.md"))
}

#[debug_handler]
async fn disclaimer() -> impl IntoResponse {
    Markdown(include_res!(str, "/pages/legal/disclaimer.md"))
}

const STATIC_PATHS: [&str; 6] = ["/", "/directory", "/signup", "/terms", "/privacy", "/disclaimer"];

fn sitemap_xml(public_url: &str, slugs: impl IntoIterator<Item = String>) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    let pro_paths = slugs.into_iter().map(|slug| format!("/pro/{slug}"));
    for path in STATIC_PATHS.into_iter().map(str::to_owned).chain(pro_paths) {
        xml += &format!("  <url><loc>{}</loc></url>\n", escape(&format!("{public_url}{path}")));
    }
    xml += "</urlset>\n";
    xml
}

#[debug_handler(state = AppState)]
async fn sitemap(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
) -> AppResult<Response> {
    let slugs = directory::search(&db_pool, &Default::default())
        .await?
        .into_iter()
        .filter_map(|entry| entry.slug);

    Ok((
        [(header::CONTENT_TYPE, "application/xml")],
        sitemap_xml(&config.public_url, slugs),
    )
        .into_response())
}
