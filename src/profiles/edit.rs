use axum::{debug_handler, extract::State, response::{Html, IntoResponse, Redirect, Response}, Form};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{include_res, res::{self, checked, escape}, session, AppResult};

use super::{form::{self, ProfileForm}, model};

async fn render_form(
    db_pool: &SqlitePool,
    session: &Session,
    template: &str,
    title: &str,
    error: Option<&str>,
) -> AppResult<Response> {
    let Some(profile_id) = session::current_profile(session).await? else {
        return Ok(Redirect::to("/login?return_url=/dashboard/profile").into_response());
    };
    let Some(profile) = model::get(db_pool, profile_id).await? else {
        return res::sorry("profile");
    };
    let details = model::details(db_pool, profile_id).await?;
    let d = details.as_ref();
    let text = |f: fn(&model::ProfessionalDetails) -> Option<&String>| {
        escape(d.and_then(f).map(String::as_str).unwrap_or_default())
    };

    let body = template
        .replace("{error}", &error.map(|e| format!(r#"<p class="error">{}</p>"#, escape(e))).unwrap_or_default())
        .replace("{full_name}", &escape(profile.full_name.as_deref().unwrap_or_default()))
        .replace("{bio}", &text(|d| d.bio.as_ref()))
        .replace("{city}", &text(|d| d.city.as_ref()))
        .replace("{state}", &text(|d| d.state.as_ref()))
        .replace("{zip_code}", &text(|d| d.zip_code.as_ref()))
        .replace("{license_number}", &text(|d| d.license_number.as_ref()))
        .replace("{website}", &text(|d| d.website.as_ref()))
        .replace("{phone}", &text(|d| d.phone.as_ref()))
        .replace("{languages}", &escape(&d.map(|d| d.languages.join(", ")).unwrap_or_default()))
        .replace("{services}", &escape(&d.map(|d| d.services.join(", ")).unwrap_or_default()))
        // new professionals show their phone unless they opt out
        .replace("{is_phone_public}", checked(d.is_none_or(|d| d.is_phone_public)))
        .replace("{is_email_public}", checked(d.is_some_and(|d| d.is_email_public)));

    Ok(Html(res::page(title, &body)).into_response())
}

async fn submit(
    db_pool: &SqlitePool,
    session: &Session,
    form: ProfileForm,
) -> AppResult<Result<(), String>> {
    let profile_id = session::require_profile(session).await?;
    let update = match form.validate() {
        Ok(update) => update,
        Err(e) => return Ok(Err(e.to_string())),
    };
    form::save(db_pool, profile_id, update).await?;
    Ok(Ok(()))
}

#[debug_handler]
pub(crate) async fn onboarding_page(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    render_form(&db_pool, &session, include_res!(str, "/pages/profiles/onboarding.html"), "Welcome", None).await
}

#[debug_handler]
pub(crate) async fn complete_onboarding(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Form(form): Form<ProfileForm>,
) -> AppResult<Response> {
    match submit(&db_pool, &session, form).await? {
        Ok(()) => Ok(Redirect::to("/dashboard").into_response()),
        Err(e) => render_form(&db_pool, &session, include_res!(str, "/pages/profiles/onboarding.html"), "Welcome", Some(&e)).await,
    }
}

#[debug_handler]
pub(crate) async fn edit_page(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    render_form(&db_pool, &session, include_res!(str, "/pages/profiles/edit.html"), "Edit profile", None).await
}

#[debug_handler]
pub(crate) async fn update_profile(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Form(form): Form<ProfileForm>,
) -> AppResult<Response> {
    let template = include_res!(str, "/pages/profiles/edit.html");
    match submit(&db_pool, &session, form).await? {
        Ok(()) => {
            let saved = template.replace("{error}", r#"<p class="success">Profile updated successfully!</p>{error}"#);
            render_form(&db_pool, &session, &saved, "Edit profile", None).await
        }
        Err(e) => render_form(&db_pool, &session, template, "Edit profile", Some(&e)).await,
    }
}
