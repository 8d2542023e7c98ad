use serde::Deserialize;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, types::Json};
use uuid::Uuid;

use crate::{error::ServiceResult, profiles::Role};

/// Query string of `/directory`. Empty fields mean "no filter".
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct DirectoryFilter {
    pub category: Option<String>,
    pub verified: Option<String>,
    pub q: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub lang: Option<String>,
}

fn given(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Lowercased `%needle%` for `LIKE ... ESCAPE '\'`, with `%` and `_` taken literally.
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.to_lowercase().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl DirectoryFilter {
    pub fn role(&self) -> ServiceResult<Option<Role>> {
        match given(&self.category) {
            None | Some("all") => Ok(None),
            Some(category) => Ok(Some(category.parse()?)),
        }
    }

    pub fn verified_only(&self) -> bool {
        matches!(given(&self.verified), Some("true" | "on" | "1"))
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DirectoryEntry {
    pub id: Uuid,
    pub slug: Option<String>,
    pub full_name: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub is_verified: bool,
    pub bio: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub languages: Option<Json<Vec<String>>>,
}

impl DirectoryEntry {
    pub fn languages(&self) -> &[String] {
        self.languages.as_ref().map(|l| l.0.as_slice()).unwrap_or_default()
    }
}

/// Professionals matching `filter`, verified first, then by name.
pub async fn search(db_pool: &SqlitePool, filter: &DirectoryFilter) -> ServiceResult<Vec<DirectoryEntry>> {
    let role = filter.role()?;

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT p.id, p.slug, p.full_name, p.role, p.is_verified, d.bio, d.city, d.state, d.languages \
         FROM profiles p LEFT JOIN professional_details d ON d.id = p.id \
         WHERE p.role IN (",
    );
    let mut roles = query.separated(", ");
    for r in Role::PROFESSIONAL {
        roles.push_bind(r.as_str());
    }
    query.push(")");

    if let Some(role) = role {
        query.push(" AND p.role = ").push_bind(role.as_str());
    }
    if filter.verified_only() {
        query.push(" AND p.is_verified = 1");
    }
    if let Some(q) = given(&filter.q) {
        let pattern = contains_pattern(q);
        query
            .push(" AND (lower(p.full_name) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR lower(coalesce(d.bio, '')) LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    if let Some(city) = given(&filter.city) {
        query
            .push(" AND lower(d.city) LIKE ")
            .push_bind(contains_pattern(city))
            .push(" ESCAPE '\\'");
    }
    if let Some(state) = given(&filter.state) {
        query.push(" AND upper(d.state) = ").push_bind(state.to_uppercase());
    }
    if let Some(lang) = given(&filter.lang) {
        query
            .push(" AND EXISTS (SELECT 1 FROM json_each(d.languages) WHERE lower(json_each.value) = ")
            .push_bind(lang.to_lowercase())
            .push(")");
    }

    query.push(" ORDER BY p.is_verified DESC, lower(coalesce(p.full_name, '')) ASC");

    let entries = query.build_query_as::<DirectoryEntry>().fetch_all(db_pool).await?;
    tracing::debug!(?filter, found = entries.len(), "directory search");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::testing,
        error::ServiceError,
        profiles::{self, ProfileUpdate},
    };

    fn located(name: &str, city: &str, state: &str, bio: &str, languages: &[&str]) -> ProfileUpdate {
        ProfileUpdate {
            full_name: name.to_owned(),
            bio: Some(bio.to_owned()),
            city: city.to_owned(),
            state: state.to_owned(),
            zip_code: None,
            license_number: None,
            website: None,
            phone: None,
            languages: languages.iter().map(|l| l.to_string()).collect(),
            services: Vec::new(),
            is_phone_public: false,
            is_email_public: false,
        }
    }

    async fn seeded() -> (SqlitePool, Uuid, Uuid, Uuid) {
        let db_pool = testing::pool().await;
        let customer = testing::profile(&db_pool, "Curious Customer", Role::Customer).await;
        profiles::save(&db_pool, customer, located("Curious Customer", "Austin", "TX", "", &[]))
            .await
            .unwrap();

        let rita = testing::profile(&db_pool, "Rita Realtor", Role::Realtor).await;
        profiles::save(&db_pool, rita, located("Rita Realtor", "Austin", "TX", "Homes near downtown", &["English", "Nepali"]))
            .await
            .unwrap();

        let bal = testing::profile(&db_pool, "Bal Builder", Role::Builder).await;
        profiles::save(&db_pool, bal, located("Bal Builder", "Dallas", "tx", "Custom builds", &["English"]))
            .await
            .unwrap();
        profiles::set_verified(&db_pool, bal, true).await.unwrap();

        let ivan = testing::profile(&db_pool, "Ivan Inspector", Role::Inspector).await;
        (db_pool, rita, bal, ivan)
    }

    fn names(entries: &[DirectoryEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.full_name.as_deref().unwrap_or_default()).collect()
    }

    #[tokio::test]
    async fn lists_professionals_verified_first() {
        let (db_pool, _, _, _) = seeded().await;
        let all = search(&db_pool, &DirectoryFilter::default()).await.unwrap();
        assert_eq!(names(&all), ["Bal Builder", "Ivan Inspector", "Rita Realtor"]);
    }

    #[tokio::test]
    async fn filters_combine() {
        let (db_pool, rita, bal, _) = seeded().await;

        let filter = DirectoryFilter { category: Some("realtor".into()), ..Default::default() };
        let found = search(&db_pool, &filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, rita);
        assert_eq!(found[0].languages(), ["English", "Nepali"]);

        let filter = DirectoryFilter { verified: Some("true".into()), ..Default::default() };
        assert_eq!(search(&db_pool, &filter).await.unwrap()[0].id, bal);

        let filter = DirectoryFilter { state: Some("TX".into()), city: Some("dal".into()), ..Default::default() };
        assert_eq!(names(&search(&db_pool, &filter).await.unwrap()), ["Bal Builder"]);

        let filter = DirectoryFilter { lang: Some("nepali".into()), ..Default::default() };
        assert_eq!(names(&search(&db_pool, &filter).await.unwrap()), ["Rita Realtor"]);

        let filter = DirectoryFilter { q: Some("DOWNTOWN".into()), ..Default::default() };
        assert_eq!(names(&search(&db_pool, &filter).await.unwrap()), ["Rita Realtor"]);

        let filter = DirectoryFilter { q: Some("plumbing".into()), ..Default::default() };
        assert!(search(&db_pool, &filter).await.unwrap().is_empty());
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(contains_pattern("Dal"), "%dal%");
        assert_eq!(contains_pattern("100%_a\\b"), "%100\\%\\_a\\\\b%");
    }

    #[tokio::test]
    async fn wildcards_in_search_match_literally() {
        let (db_pool, rita, _, _) = seeded().await;
        for wild in ["%", "_", "\\"] {
            let filter = DirectoryFilter { q: Some(wild.into()), ..Default::default() };
            assert!(search(&db_pool, &filter).await.unwrap().is_empty(), "q={wild}");
            let filter = DirectoryFilter { city: Some(wild.into()), ..Default::default() };
            assert!(search(&db_pool, &filter).await.unwrap().is_empty(), "city={wild}");
        }

        profiles::save(&db_pool, rita, located("Rita Realtor", "Austin", "TX", "0% down_payment help", &[]))
            .await
            .unwrap();
        let filter = DirectoryFilter { q: Some("0% down_".into()), ..Default::default() };
        assert_eq!(names(&search(&db_pool, &filter).await.unwrap()), ["Rita Realtor"]);
        let filter = DirectoryFilter { q: Some("%_".into()), ..Default::default() };
        assert!(search(&db_pool, &filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn customers_never_listed() {
        let (db_pool, _, _, _) = seeded().await;
        let filter = DirectoryFilter { q: Some("curious".into()), ..Default::default() };
        assert!(search(&db_pool, &filter).await.unwrap().is_empty());

        let filter = DirectoryFilter { category: Some("customer".into()), ..Default::default() };
        assert!(search(&db_pool, &filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_category_is_rejected() {
        let (db_pool, _, _, _) = seeded().await;
        let filter = DirectoryFilter { category: Some("plumber".into()), ..Default::default() };
        assert!(matches!(search(&db_pool, &filter).await, Err(ServiceError::Validation(_))));

        let filter = DirectoryFilter { category: Some("all".into()), ..Default::default() };
        assert_eq!(search(&db_pool, &filter).await.unwrap().len(), 3);
    }
}
