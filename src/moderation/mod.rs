pub mod block;
mod admin;
pub mod report;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub use block::{is_blocked, set_block};
pub use report::{NewReport, Report, ReportStatus, Reporter};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profiles/{id}/block", post(block::toggle_block))
        .route("/profiles/{id}/report", post(report::report_profile))
        .route("/report", get(report::general_report_page).post(report::submit_general_report))
        .route("/report/thanks", get(report::thanks))
        .route("/admin", get(admin::dashboard))
        .route("/admin/reports", get(admin::reports))
        .route("/admin/reports/{id}", post(admin::review_report))
        .route("/admin/profiles/{id}/verify", post(admin::verify_profile))
}
