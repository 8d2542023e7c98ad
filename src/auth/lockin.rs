use std::sync::Arc;

use axum::{debug_handler, extract::{Path, Query, State}, response::{IntoResponse, Redirect, Response}};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    config::Config,
    profiles::{self, Role},
    session::{CSRF_STATE, PKCE_VERIFIER, PROFILE_ID, RETURN_URL, SIGNUP_ROLE},
    AppResult, AppState, GetField,
};

use super::{clients::ClientProvider, Clients};

#[derive(Deserialize)]
pub struct LockinQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

#[derive(Serialize)]
struct FirebaseRequest {
    post_body: String,
    request_uri: String,
    return_idp_credential: bool,
    return_secure_token: bool,
}

impl FirebaseRequest {
    /// `request_uri` is where the provider sent the user back, so it is this site.
    fn new(provider: ClientProvider, access_token: &str, public_url: &str) -> Self {
        FirebaseRequest {
            post_body: format!("access_token={access_token}&providerId={}", provider.id()),
            request_uri: format!("{public_url}/"),
            return_idp_credential: true,
            return_secure_token: true,
        }
    }
}

/// The parts of a Firebase sign-in answer a profile is built from.
#[derive(Debug, PartialEq)]
pub(crate) struct Identity {
    pub(crate) auth_id: String,
    pub(crate) email: String,
    pub(crate) display_name: Option<String>,
}

impl Identity {
    pub(crate) fn from_firebase(body: &Value) -> AppResult<Identity> {
        let optional = |field: &str| {
            body.get(field)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };
        Ok(Identity {
            auth_id: body.get_str_field("localId")?,
            email: optional("email").unwrap_or_default(),
            display_name: optional("displayName"),
        })
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    Path(provider): Path<ClientProvider>,
    Query(LockinQuery { state, code }): Query<LockinQuery>,
    State(db_pool): State<SqlitePool>,
    State(clients): State<Clients>,
    State(config): State<Arc<Config>>,
    session: Session,
) -> AppResult<Response> {
    let state = CsrfToken::new(state.ok_or("OAuth: without state")?);
    let code = AuthorizationCode::new(code.ok_or("OAuth: without code")?);

    let Some(stored_state) = session.remove::<String>(CSRF_STATE).await? else {
        return Err("no csrf_state")?;
    };

    if state.secret().as_str() != stored_state.as_str() {
        tracing::warn!(%provider, "csrf state mismatch");
        return Err("csrf tokens don't match")?;
    }

    let Some(pkce_verifier) = session.remove::<String>(PKCE_VERIFIER).await? else {
        return Err("no pkce_verifier")?;
    };
    let firebase_idpurl = clients.firebase_idpurl.clone().ok_or("OAuth is not configured")?;

    let client = clients.get_client(provider)?;
    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let token_result = client
        .exchange_code(code)
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&http_client)
        .await?;

    let access_token = token_result.access_token().secret();
    let body: Value = http_client.post(firebase_idpurl)
        .json(&FirebaseRequest::new(provider, access_token, &config.public_url))
        .send()
        .await?
        .json()
        .await?;

    let identity = Identity::from_firebase(&body)?;
    let role = session.remove::<Role>(SIGNUP_ROLE).await?.unwrap_or(Role::Customer);
    let existed = profiles::find_by_auth_id(&db_pool, &identity.auth_id).await?.is_some();
    let profile_id = profiles::create_for_login(
        &db_pool,
        &identity.auth_id,
        &identity.email,
        identity.display_name.as_deref(),
        role,
    )
    .await?;

    session.cycle_id().await?;
    session.insert(PROFILE_ID, profile_id).await?;

    tracing::info!(%provider, %profile_id, new = !existed, "logged in");

    if !existed && role.is_professional() {
        return Ok(Redirect::to("/onboarding").into_response());
    }
    let return_url = session.remove::<String>(RETURN_URL).await?;
    Ok(Redirect::to(return_url.as_deref().unwrap_or("/dashboard")).into_response())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn identity_from_firebase_answer() {
        let body = json!({
            "localId": "abc123",
            "email": "sita@example.com",
            "displayName": "  Sita Sharma ",
            "idToken": "..."
        });
        assert_eq!(
            Identity::from_firebase(&body).unwrap(),
            Identity {
                auth_id: "abc123".into(),
                email: "sita@example.com".into(),
                display_name: Some("Sita Sharma".into()),
            }
        );

        let bare = Identity::from_firebase(&json!({ "localId": "x", "displayName": "" })).unwrap();
        assert_eq!(bare.email, "");
        assert_eq!(bare.display_name, None);

        assert!(Identity::from_firebase(&json!({})).is_err());
    }

    #[test]
    fn firebase_request_names_this_site() {
        let request = FirebaseRequest::new(ClientProvider::Github, "tok", "https://merogharinusa.com");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["request_uri"], "https://merogharinusa.com/");
        assert_eq!(json["post_body"], "access_token=tok&providerId=github.com");
        assert_eq!(json["return_secure_token"], true);
    }
}
