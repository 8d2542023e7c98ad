use std::{fmt, str::FromStr};

use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, types::Json};
use uuid::Uuid;

use crate::{db::now_millis, error::{ServiceError, ServiceResult}};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Realtor,
    Inspector,
    Builder,
    LoanOfficer,
    Admin,
}

impl Role {
    /// Roles listed in the directory, in display order.
    pub const PROFESSIONAL: [Role; 4] = [Role::Realtor, Role::LoanOfficer, Role::Inspector, Role::Builder];

    pub fn as_str(&self) -> &'static str {
        use Role::*;
        match self {
            Customer => "customer",
            Realtor => "realtor",
            Inspector => "inspector",
            Builder => "builder",
            LoanOfficer => "loan_officer",
            Admin => "admin",
        }
    }

    pub fn label(&self) -> &'static str {
        use Role::*;
        match self {
            Customer => "Customer",
            Realtor => "Realtor",
            Inspector => "Home Inspector",
            Builder => "Builder",
            LoanOfficer => "Loan Officer",
            Admin => "Admin",
        }
    }

    pub fn is_professional(&self) -> bool {
        Self::PROFESSIONAL.contains(self)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Role::*;
        Ok(match s {
            "customer" => Customer,
            "realtor" => Realtor,
            "inspector" => Inspector,
            "builder" => Builder,
            "loan_officer" => LoanOfficer,
            "admin" => Admin,
            _ => return Err(ServiceError::validation(format!("Unknown role {s:?}."))),
        })
    }
}

impl TryFrom<String> for Role {
    type Error = ServiceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub slug: Option<String>,
    pub full_name: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub is_verified: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Profile {
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or("Unnamed")
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ProfessionalDetails {
    pub id: Uuid,
    pub bio: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub license_number: Option<String>,
    pub phone: Option<String>,
    pub is_phone_public: bool,
    pub is_email_public: bool,
    pub website: Option<String>,
    pub languages: Json<Vec<String>>,
    pub services: Json<Vec<String>>,
}

const PROFILE_COLUMNS: &str = "id,email,slug,full_name,role,is_verified,created_at,updated_at";

pub async fn get(db_pool: &SqlitePool, id: Uuid) -> ServiceResult<Option<Profile>> {
    Ok(sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id=?"))
        .bind(id)
        .fetch_optional(db_pool)
        .await?)
}

pub async fn find_by_slug(db_pool: &SqlitePool, slug: &str) -> ServiceResult<Option<Profile>> {
    Ok(sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE slug=?"))
        .bind(slug)
        .fetch_optional(db_pool)
        .await?)
}

pub async fn find_by_auth_id(db_pool: &SqlitePool, auth_id: &str) -> ServiceResult<Option<Profile>> {
    Ok(sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE auth_id=?"))
        .bind(auth_id)
        .fetch_optional(db_pool)
        .await?)
}

pub async fn exists(db_pool: &SqlitePool, id: Uuid) -> ServiceResult<bool> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM profiles WHERE id=?")
        .bind(id)
        .fetch_optional(db_pool)
        .await?;
    Ok(row.is_some())
}

pub async fn details(db_pool: &SqlitePool, id: Uuid) -> ServiceResult<Option<ProfessionalDetails>> {
    Ok(sqlx::query_as(
        "SELECT id,bio,city,state,zip_code,license_number,phone,is_phone_public,is_email_public,website,languages,services FROM professional_details WHERE id=?",
    )
    .bind(id)
    .fetch_optional(db_pool)
    .await?)
}

pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() { "pro".to_owned() } else { slug.to_owned() }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(e) if e.is_unique_violation())
}

/// Signup: creates the profile for an identity on its first login.
/// Returns the existing profile id when one is already linked.
pub async fn create_for_login(
    db_pool: &SqlitePool,
    auth_id: &str,
    email: &str,
    full_name: Option<&str>,
    role: Role,
) -> ServiceResult<Uuid> {
    if role == Role::Admin {
        return Err(ServiceError::validation("Admin accounts cannot be created at signup."));
    }
    if let Some(profile) = find_by_auth_id(db_pool, auth_id).await? {
        return Ok(profile.id);
    }

    let base = slugify(full_name.unwrap_or(email.split('@').next().unwrap_or_default()));
    let id = Uuid::now_v7();
    let now = now_millis();

    for _ in 0..5 {
        let slug = format!("{base}-{}", rand::rng().random_range(0..1000));
        let inserted = sqlx::query(
            "INSERT INTO profiles (id,auth_id,email,slug,full_name,role,is_verified,created_at,updated_at) VALUES (?,?,?,?,?,?,0,?,?)",
        )
        .bind(id)
        .bind(auth_id)
        .bind(email)
        .bind(&slug)
        .bind(full_name)
        .bind(role.as_str())
        .bind(now)
        .bind(now)
        .execute(db_pool)
        .await;

        match inserted {
            Ok(_) => {
                tracing::info!(profile_id = %id, %slug, %role, "profile created");
                return Ok(id);
            }
            Err(e) if is_unique_violation(&e) => {
                // a concurrent login for the same identity may have won
                if let Some(profile) = find_by_auth_id(db_pool, auth_id).await? {
                    return Ok(profile.id);
                }
                tracing::debug!(%slug, "slug taken, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ServiceError::validation("Could not allocate a profile address, please try again."))
}

pub async fn set_verified(db_pool: &SqlitePool, id: Uuid, verified: bool) -> ServiceResult<()> {
    let result = sqlx::query("UPDATE profiles SET is_verified=?, updated_at=? WHERE id=?")
        .bind(verified)
        .bind(now_millis())
        .bind(id)
        .execute(db_pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ServiceError::NotFound("Profile"));
    }
    tracing::info!(profile_id = %id, verified, "verification changed");
    Ok(())
}

pub async fn count(db_pool: &SqlitePool) -> ServiceResult<i64> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM profiles")
        .fetch_one(db_pool)
        .await?;
    Ok(n)
}
