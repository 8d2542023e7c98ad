use axum::{debug_handler, extract::{Path, State}, response::{Html, IntoResponse, Response}};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{include_res, moderation::block, policy::SharedPolicy, res::{self, escape}, session, AppResult};

use super::model::{self, ProfessionalDetails, Profile};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn profile(
    Path(slug): Path<String>,
    State(db_pool): State<SqlitePool>,
    State(policy): State<SharedPolicy>,
    session: Session,
) -> AppResult<Response> {
    let Some(profile) = model::find_by_slug(&db_pool, &slug).await? else {
        return res::sorry("profile");
    };
    if !profile.role.is_professional() {
        return res::sorry("profile");
    }
    let details = model::details(&db_pool, profile.id).await?;

    let viewer = session::current_profile(&session).await?;
    let mut actions = match viewer {
        None => format!(
            r#"<p><a href="/login?return_url=/pro/{}">Log in</a> to message {}.</p>"#,
            escape(&slug),
            escape(profile.display_name())
        ),
        Some(viewer) if viewer == profile.id => {
            r#"<p>This is your public profile. <a href="/dashboard/profile">Edit it</a>.</p>"#.to_owned()
        }
        Some(viewer) => {
            let blocked = block::is_blocked(&db_pool, viewer, profile.id).await?;
            include_res!(str, "/pages/profiles/actions.html")
                .replace("{id}", &profile.id.to_string())
                .replace("{name}", &escape(profile.display_name()))
                .replace("{block_value}", if blocked { "false" } else { "true" })
                .replace("{block_label}", if blocked { "Unblock" } else { "Block" })
        }
    };

    if let Some(viewer) = viewer {
        if policy.is_admin(viewer).await? {
            actions += &verify_form(&profile);
        }
    }

    let body = render(&profile, details.as_ref())
        .replace("{actions}", &actions);

    Ok(Html(res::page(profile.display_name(), &body)).into_response())
}

fn verify_form(profile: &Profile) -> String {
    let (value, label) = if profile.is_verified {
        ("false", "Remove verification")
    } else {
        ("true", "Mark as verified")
    };
    format!(
        r#"<form action="/admin/profiles/{}/verify" method="post"><input type="hidden" name="verified" value="{value}"><button>{label}</button></form>"#,
        profile.id
    )
}

fn render(profile: &Profile, details: Option<&ProfessionalDetails>) -> String {
    let mut contact = String::new();
    let mut location = String::new();
    let mut bio = String::new();
    let mut facts = String::new();

    if let Some(d) = details {
        location = [d.city.as_deref(), d.state.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ");
        bio = d.bio.clone().unwrap_or_default();

        if d.is_phone_public {
            if let Some(phone) = &d.phone {
                contact += &format!("<li>Phone: {}</li>", escape(phone));
            }
        }
        if d.is_email_public {
            contact += &format!("<li>Email: {}</li>", escape(&profile.email));
        }
        if let Some(website) = &d.website {
            contact += &format!(
                r#"<li><a href="{0}" rel="nofollow noopener">{0}</a></li>"#,
                escape(website)
            );
        }
        if let Some(license) = &d.license_number {
            facts += &format!("<li>License #{}</li>", escape(license));
        }
        if !d.languages.is_empty() {
            facts += &format!("<li>Speaks {}</li>", escape(&d.languages.join(", ")));
        }
        if !d.services.is_empty() {
            facts += &format!("<li>Services: {}</li>", escape(&d.services.join(", ")));
        }
    }

    include_res!(str, "/pages/profiles/profile.html")
        .replace("{name}", &escape(profile.display_name()))
        .replace("{role}", profile.role.label())
        .replace("{verified}", if profile.is_verified { "<span class=\"badge\">Verified</span>" } else { "" })
        .replace("{location}", &escape(&location))
        .replace("{bio}", &escape(&bio))
        .replace("{facts}", &facts)
        .replace("{contact}", &contact)
}
