use axum::{debug_handler, extract::{Path, Query, State}, response::{Html, IntoResponse, Redirect, Response}};
use oauth2::{CsrfToken, PkceCodeChallenge, Scope};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{include_res, res, session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL}, AppResult};

use super::{clients::ClientProvider, Clients};

#[derive(Deserialize)]
pub(crate) struct LoginQuery {
    pub(crate) return_url: Option<String>,
}

/// Only same-site paths are followed after login.
pub(crate) fn local_path(url: Option<String>) -> Option<String> {
    url.filter(|u| u.starts_with('/') && !u.starts_with("//") && !u.contains('\\'))
}

async fn remember_return_url(session: &Session, return_url: Option<String>) -> AppResult<()> {
    if let Some(return_url) = local_path(return_url) {
        session.insert(RETURN_URL, return_url).await?;
    }
    Ok(())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn login_page(
    Query(LoginQuery { return_url }): Query<LoginQuery>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<Response> {
    remember_return_url(&session, return_url).await?;

    let mut providers = String::new();
    for provider in ClientProvider::ALL {
        if clients.is_enabled(provider) {
            providers += &format!(
                r#"<li><a class="button" href="/login/{}">Continue with {provider}</a></li>"#,
                provider.slug()
            );
        }
    }
    if providers.is_empty() {
        providers = "<li>Sign-in is currently unavailable.</li>".to_owned();
    }

    Ok(Html(res::page(
        "Log in",
        &include_res!(str, "/pages/auth/login.html").replace("{providers}", &providers),
    ))
    .into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn login(
    Path(provider): Path<ClientProvider>,
    Query(LoginQuery { return_url }): Query<LoginQuery>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<Response> {
    let client = clients.get_client(provider)?;

    let (pkce_code_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (authorize_url, csrf_state) = client.authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new("openid".to_string()))
        .add_scope(Scope::new(provider.email_scope().to_string()))
        .set_pkce_challenge(pkce_code_challenge)
        .url();

    session.insert(CSRF_STATE, csrf_state.secret()).await?;
    session.insert(PKCE_VERIFIER, pkce_verifier.secret()).await?;
    remember_return_url(&session, return_url).await?;

    tracing::debug!(%provider, "redirecting to provider");
    Ok(Redirect::to(authorize_url.as_str()).into_response())
}
