use reqwest::Url;
use serde::Deserialize;
use sqlx::{SqlitePool, types::Json};
use uuid::Uuid;

use crate::{db::now_millis, error::{ServiceError, ServiceResult}};

/// Shared by onboarding and the dashboard editor. List fields are comma separated.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProfileForm {
    pub full_name: String,
    pub bio: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub license_number: String,
    pub website: String,
    pub phone: String,
    pub languages: String,
    pub services: String,
    pub is_phone_public: Option<String>,
    pub is_email_public: Option<String>,
}

#[derive(Debug, PartialEq)]
pub struct ProfileUpdate {
    pub full_name: String,
    pub bio: Option<String>,
    pub city: String,
    pub state: String,
    pub zip_code: Option<String>,
    pub license_number: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub languages: Vec<String>,
    pub services: Vec<String>,
    pub is_phone_public: bool,
    pub is_email_public: bool,
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

fn required(field: &str, value: &str, min: usize) -> ServiceResult<String> {
    let value = value.trim();
    if value.chars().count() < min {
        return Err(ServiceError::validation(format!("{field} must be at least {min} characters.")));
    }
    Ok(value.to_owned())
}

fn list(value: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !items.iter().any(|seen| seen.eq_ignore_ascii_case(item)) {
            items.push(item.to_owned());
        }
    }
    items
}

/// Empty means no website; a bare host gets `https://`.
pub fn normalize_website(value: &str) -> ServiceResult<Option<String>> {
    let Some(value) = optional(value) else {
        return Ok(None);
    };
    let value = if value.starts_with("http://") || value.starts_with("https://") {
        value
    } else {
        format!("https://{value}")
    };
    match Url::parse(&value) {
        Ok(url) if url.host_str().is_some_and(|h| h.contains('.')) => Ok(Some(value)),
        _ => Err(ServiceError::validation("Website must be a valid URL.")),
    }
}

impl ProfileForm {
    pub fn validate(self) -> ServiceResult<ProfileUpdate> {
        Ok(ProfileUpdate {
            full_name: required("Full name", &self.full_name, 2)?,
            bio: optional(&self.bio),
            city: required("City", &self.city, 2)?,
            state: required("State", &self.state, 2)?,
            zip_code: optional(&self.zip_code),
            license_number: optional(&self.license_number),
            website: normalize_website(&self.website)?,
            phone: optional(&self.phone),
            languages: list(&self.languages),
            services: list(&self.services),
            is_phone_public: self.is_phone_public.is_some(),
            is_email_public: self.is_email_public.is_some(),
        })
    }
}

/// Updates the name and upserts professional details in one transaction.
pub async fn save(db_pool: &SqlitePool, profile_id: Uuid, update: ProfileUpdate) -> ServiceResult<()> {
    let mut tx = db_pool.begin().await?;

    let result = sqlx::query("UPDATE profiles SET full_name=?, updated_at=? WHERE id=?")
        .bind(&update.full_name)
        .bind(now_millis())
        .bind(profile_id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ServiceError::NotFound("Profile"));
    }

    sqlx::query(
        r#"
        INSERT INTO professional_details
            (id,bio,city,state,zip_code,license_number,phone,is_phone_public,is_email_public,website,languages,services)
        VALUES (?,?,?,?,?,?,?,?,?,?,?,?)
        ON CONFLICT(id) DO UPDATE SET
            bio=excluded.bio,
            city=excluded.city,
            state=excluded.state,
            zip_code=excluded.zip_code,
            license_number=excluded.license_number,
            phone=excluded.phone,
            is_phone_public=excluded.is_phone_public,
            is_email_public=excluded.is_email_public,
            website=excluded.website,
            languages=excluded.languages,
            services=excluded.services
        "#,
    )
    .bind(profile_id)
    .bind(&update.bio)
    .bind(&update.city)
    .bind(&update.state)
    .bind(&update.zip_code)
    .bind(&update.license_number)
    .bind(&update.phone)
    .bind(update.is_phone_public)
    .bind(update.is_email_public)
    .bind(&update.website)
    .bind(Json(&update.languages))
    .bind(Json(&update.services))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(%profile_id, "profile saved");
    Ok(())
}
