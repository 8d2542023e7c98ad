//! Complaints for admin review.
//!
//! Signed-in users report as themselves. Visitors without a session use the
//! anonymous path, which stores no reporter and skips every per-user check,
//! since there is no identity to authorize against.

use std::fmt;

use axum::{debug_handler, extract::{Path, State}, response::{Html, IntoResponse, Redirect, Response}, Form};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    db::now_millis,
    error::{ServiceError, ServiceResult},
    include_res,
    policy::{self, Policy},
    profiles,
    res::{self, escape},
    session, AppResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Resolved,
    Dismissed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Dismissed => "dismissed",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ReportStatus {
    type Error = ServiceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "pending" => Ok(ReportStatus::Pending),
            "resolved" => Ok(ReportStatus::Resolved),
            "dismissed" => Ok(ReportStatus::Dismissed),
            _ => Err(ServiceError::validation(format!("Unknown report status {s:?}."))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reporter {
    Anonymous,
    User(Uuid),
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub reported_id: Option<Uuid>,
    pub message_id: Option<Uuid>,
    pub reason: String,
    pub details: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Report {
    pub id: Uuid,
    pub reporter_id: Option<Uuid>,
    pub reported_id: Option<Uuid>,
    pub message_id: Option<Uuid>,
    pub reason: String,
    pub details: String,
    #[sqlx(try_from = "String")]
    pub status: ReportStatus,
    pub created_at: i64,
    pub reviewed_at: Option<i64>,
}

/// A report joined with the display names of both parties.
#[derive(Debug, Clone, FromRow)]
pub struct ReportRow {
    #[sqlx(flatten)]
    pub report: Report,
    pub reporter_name: Option<String>,
    pub reported_name: Option<String>,
    pub reported_slug: Option<String>,
}

pub async fn submit(db_pool: &SqlitePool, reporter: Reporter, report: NewReport) -> ServiceResult<Uuid> {
    if report.reason.trim().is_empty() {
        return Err(ServiceError::validation("Missing required fields."));
    }
    if let Some(reported_id) = report.reported_id {
        if reporter == Reporter::User(reported_id) {
            return Err(ServiceError::SelfReport);
        }
        if !profiles::exists(db_pool, reported_id).await? {
            return Err(ServiceError::NotFound("Profile"));
        }
    }

    let reporter_id = match reporter {
        Reporter::User(id) => Some(id),
        Reporter::Anonymous => None,
    };

    let id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO reports (id,reporter_id,reported_id,message_id,reason,details,status,created_at) VALUES (?,?,?,?,?,?,'pending',?)",
    )
    .bind(id)
    .bind(reporter_id)
    .bind(report.reported_id)
    .bind(report.message_id)
    .bind(report.reason.trim())
    .bind(report.details.trim())
    .bind(now_millis())
    .execute(db_pool)
    .await?;

    tracing::info!(report_id = %id, anonymous = reporter_id.is_none(), "report submitted");
    Ok(id)
}

pub async fn get(db_pool: &SqlitePool, id: Uuid) -> ServiceResult<Option<Report>> {
    Ok(sqlx::query_as(
        "SELECT id,reporter_id,reported_id,message_id,reason,details,status,created_at,reviewed_at FROM reports WHERE id=?",
    )
    .bind(id)
    .fetch_optional(db_pool)
    .await?)
}

/// Moves a pending report to `outcome`. Reviewed reports are final.
pub async fn review(
    db_pool: &SqlitePool,
    policy: &dyn Policy,
    admin: Uuid,
    report_id: Uuid,
    outcome: ReportStatus,
) -> ServiceResult<()> {
    policy::require_admin(policy, admin).await?;
    if outcome == ReportStatus::Pending {
        return Err(ServiceError::validation("A report can only be resolved or dismissed."));
    }

    let result = sqlx::query("UPDATE reports SET status=?, reviewed_at=? WHERE id=? AND status='pending'")
        .bind(outcome.as_str())
        .bind(now_millis())
        .bind(report_id)
        .execute(db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return match get(db_pool, report_id).await? {
            Some(report) => Err(ServiceError::AlreadyReviewed(report.status)),
            None => Err(ServiceError::NotFound("Report")),
        };
    }

    tracing::info!(%report_id, %outcome, %admin, "report reviewed");
    Ok(())
}

pub async fn list(db_pool: &SqlitePool) -> ServiceResult<Vec<ReportRow>> {
    Ok(sqlx::query_as(
        r#"
        SELECT r.id, r.reporter_id, r.reported_id, r.message_id, r.reason, r.details, r.status,
               r.created_at, r.reviewed_at,
               reporter.full_name AS reporter_name,
               reported.full_name AS reported_name,
               reported.slug AS reported_slug
        FROM reports r
        LEFT JOIN profiles reporter ON reporter.id = r.reporter_id
        LEFT JOIN profiles reported ON reported.id = r.reported_id
        ORDER BY r.created_at DESC
        "#,
    )
    .fetch_all(db_pool)
    .await?)
}

pub async fn pending_count(db_pool: &SqlitePool) -> ServiceResult<i64> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reports WHERE status='pending'")
        .fetch_one(db_pool)
        .await?;
    Ok(n)
}

fn parse_optional_uuid(value: Option<&str>) -> ServiceResult<Option<Uuid>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => Uuid::parse_str(v)
            .map(Some)
            .map_err(|_| ServiceError::validation("Malformed message reference.")),
    }
}

#[derive(Deserialize)]
pub(crate) struct ProfileReportForm {
    reason: String,
    #[serde(default)]
    details: String,
    message_id: Option<String>,
}

#[debug_handler]
pub(crate) async fn report_profile(
    Path(reported_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    session: Session,
    Form(form): Form<ProfileReportForm>,
) -> AppResult<Response> {
    let reporter = session::require_profile(&session).await?;
    submit(
        &db_pool,
        Reporter::User(reporter),
        NewReport {
            reported_id: Some(reported_id),
            message_id: parse_optional_uuid(form.message_id.as_deref())?,
            reason: form.reason,
            details: form.details,
        },
    )
    .await?;

    Ok(Html(res::notice(
        "Report submitted",
        "Report submitted successfully. We will review it shortly.",
    ))
    .into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GeneralReportForm {
    pub reason: String,
    pub details: String,
    pub email: String,
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty())
        && !email.contains(char::is_whitespace)
}

impl GeneralReportForm {
    pub fn validate(self) -> ServiceResult<NewReport> {
        let reason = self.reason.trim();
        let details = self.details.trim();
        let email = self.email.trim();

        if reason.is_empty() {
            return Err(ServiceError::validation("Reason is required."));
        }
        if details.chars().count() < 10 {
            return Err(ServiceError::validation("Please provide more details."));
        }
        let details = if email.is_empty() {
            details.to_owned()
        } else if looks_like_email(email) {
            format!("{details}\n\n[Contact Email: {email}]")
        } else {
            return Err(ServiceError::validation("Contact email is not valid."));
        };

        Ok(NewReport {
            reported_id: None,
            message_id: None,
            reason: reason.to_owned(),
            details,
        })
    }
}

#[debug_handler]
pub(crate) async fn general_report_page() -> impl IntoResponse {
    Html(res::page(
        "Report a concern",
        &include_res!(str, "/pages/moderation/report.html").replace("{error}", ""),
    ))
}

#[debug_handler]
pub(crate) async fn submit_general_report(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Form(form): Form<GeneralReportForm>,
) -> AppResult<Response> {
    let report = match form.validate() {
        Ok(report) => report,
        Err(e) => {
            let body = include_res!(str, "/pages/moderation/report.html")
                .replace("{error}", &format!(r#"<p class="error">{}</p>"#, escape(&e.to_string())));
            return Ok((e.status(), Html(res::page("Report a concern", &body))).into_response());
        }
    };

    let reporter = match session::current_profile(&session).await? {
        Some(id) => Reporter::User(id),
        None => Reporter::Anonymous,
    };
    submit(&db_pool, reporter, report).await?;

    Ok(Redirect::to("/report/thanks").into_response())
}

#[debug_handler]
pub(crate) async fn thanks() -> impl IntoResponse {
    Html(res::notice(
        "Report submitted",
        "Report submitted successfully. We will review it shortly.",
    ))
}
