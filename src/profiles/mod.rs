mod edit;
mod form;
mod model;
mod page;

use axum::{routing, Router};

use crate::AppState;

pub use form::{normalize_website, save, ProfileForm, ProfileUpdate};
pub use model::{
    count, create_for_login, details, exists, find_by_auth_id, find_by_slug, get, set_verified,
    slugify, ProfessionalDetails, Profile, Role,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pro/{slug}", routing::get(page::profile))
        .route("/onboarding", routing::get(edit::onboarding_page).post(edit::complete_onboarding))
        .route("/dashboard/profile", routing::get(edit::edit_page).post(edit::update_profile))
}

#[cfg(test)]
mod tests {
    use crate::db::testing;

    use super::*;

    #[tokio::test]
    async fn module_level_lookups_reach_the_store() {
        let db_pool = testing::pool().await;
        let id = testing::profile(&db_pool, "Gita Builder", Role::Builder).await;

        let profile = get(&db_pool, id).await.unwrap().unwrap();
        assert_eq!(profile.display_name(), "Gita Builder");
        assert_eq!(find_by_slug(&db_pool, "gita-builder").await.unwrap().unwrap().id, id);
        assert!(exists(&db_pool, id).await.unwrap());
        assert!(get(&db_pool, uuid::Uuid::now_v7()).await.unwrap().is_none());
    }
}
