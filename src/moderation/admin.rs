use axum::{debug_handler, extract::{Path, State}, response::{Html, IntoResponse, Redirect, Response}, Form};
use serde::Deserialize;
use sqlx::SqlitePool;
use time::format_description::well_known::Rfc3339;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    db::millis_to_datetime,
    include_res,
    policy::{self, SharedPolicy},
    profiles,
    res::{self, escape},
    session, AppResult,
};

use super::report::{self, ReportRow, ReportStatus};

async fn require_admin(session: &Session, policy: &SharedPolicy) -> AppResult<Uuid> {
    let admin = session::require_profile(session).await?;
    policy::require_admin(policy.as_ref(), admin).await?;
    Ok(admin)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn dashboard(
    State(db_pool): State<SqlitePool>,
    State(policy): State<SharedPolicy>,
    session: Session,
) -> AppResult<Response> {
    require_admin(&session, &policy).await?;

    let body = include_res!(str, "/pages/moderation/admin.html")
        .replace("{pending}", &report::pending_count(&db_pool).await?.to_string())
        .replace("{users}", &profiles::count(&db_pool).await?.to_string());
    Ok(Html(res::page("Admin", &body)).into_response())
}

fn render_row(row: &ReportRow) -> String {
    let r = &row.report;
    let reported = match (&row.reported_name, &row.reported_slug) {
        (Some(name), Some(slug)) => format!(r#"<a href="/pro/{}">{}</a>"#, escape(slug), escape(name)),
        (Some(name), None) => escape(name),
        _ if r.reported_id.is_some() => "Unnamed".to_owned(),
        _ => "General".to_owned(),
    };
    let actions = if r.status == ReportStatus::Pending {
        include_res!(str, "/pages/moderation/review_actions.html").replace("{id}", &r.id.to_string())
    } else {
        String::new()
    };
    let created = millis_to_datetime(r.created_at)
        .format(&Rfc3339)
        .unwrap_or_default();

    include_res!(str, "/pages/moderation/report_row.html")
        .replace("{created}", &created)
        .replace("{reporter}", &escape(row.reporter_name.as_deref().unwrap_or("Anonymous")))
        .replace("{reported}", &reported)
        .replace("{reason}", &escape(&r.reason))
        .replace("{details}", &escape(&r.details))
        .replace("{status}", r.status.as_str())
        .replace("{actions}", &actions)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn reports(
    State(db_pool): State<SqlitePool>,
    State(policy): State<SharedPolicy>,
    session: Session,
) -> AppResult<Response> {
    require_admin(&session, &policy).await?;

    let rows: String = report::list(&db_pool).await?.iter().map(render_row).collect();
    let body = include_res!(str, "/pages/moderation/reports.html").replace("{rows}", &rows);
    Ok(Html(res::page("Reports", &body)).into_response())
}

#[derive(Deserialize)]
pub(crate) struct ReviewForm {
    status: ReportStatus,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn review_report(
    Path(report_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(policy): State<SharedPolicy>,
    session: Session,
    Form(ReviewForm { status }): Form<ReviewForm>,
) -> AppResult<Response> {
    let admin = session::require_profile(&session).await?;
    report::review(&db_pool, policy.as_ref(), admin, report_id, status).await?;
    Ok(Redirect::to("/admin/reports").into_response())
}

#[derive(Deserialize)]
pub(crate) struct VerifyForm {
    verified: bool,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn verify_profile(
    Path(profile_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(policy): State<SharedPolicy>,
    session: Session,
    Form(VerifyForm { verified }): Form<VerifyForm>,
) -> AppResult<Response> {
    require_admin(&session, &policy).await?;
    profiles::set_verified(&db_pool, profile_id, verified).await?;

    let back = match profiles::get(&db_pool, profile_id).await?.and_then(|p| p.slug) {
        Some(slug) => format!("/pro/{slug}"),
        None => "/admin".to_owned(),
    };
    Ok(Redirect::to(&back).into_response())
}
