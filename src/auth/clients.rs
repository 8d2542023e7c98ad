use std::{fmt, path::Path};

use anyhow::Context;
use oauth2::{basic::BasicClient, AuthUrl, Client, ClientId, ClientSecret, RedirectUrl, TokenUrl};
use serde::Deserialize;
use serde_json::Value;

use crate::{AppResult, GetField};

type ProviderClient = Client<oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>, oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardTokenIntrospectionResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardRevocableToken, oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>, oauth2::EndpointSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointSet>;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Github,
}

impl ClientProvider {
    pub const ALL: [ClientProvider; 2] = [ClientProvider::Google, ClientProvider::Github];

    /// Firebase provider id.
    pub fn id(&self) -> &'static str {
        use ClientProvider::*;
        match self {
            Google => "google.com",
            Github => "github.com",
        }
    }

    pub fn slug(&self) -> &'static str {
        use ClientProvider::*;
        match self {
            Google => "google",
            Github => "github",
        }
    }

    pub fn email_scope(&self) -> &'static str {
        use ClientProvider::*;
        match self {
            Google => "email",
            Github => "user:email",
        }
    }

    fn endpoints(&self) -> (&'static str, &'static str) {
        use ClientProvider::*;
        match self {
            Google => ("https://accounts.google.com/o/oauth2/auth", "https://oauth2.googleapis.com/token"),
            Github => ("https://github.com/login/oauth/authorize", "https://github.com/login/oauth/access_token"),
        }
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, Default)]
pub struct Clients {
    pub(crate) firebase_idpurl: Option<String>,
    google_client: Option<ProviderClient>,
    github_client: Option<ProviderClient>,
}

impl Clients {
    /// No providers; every login attempt is refused.
    pub fn empty() -> Clients {
        Clients::default()
    }

    /// Reads the secrets file, or falls back to [`Clients::empty`] when it is absent.
    pub fn load(path: &Path, public_url: &str) -> anyhow::Result<Clients> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "client secrets missing, logins disabled");
            return Ok(Clients::empty());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let json: Value = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        Clients::from_json(&json, public_url).map_err(|e| e.0)
    }

    pub fn from_json(json: &Value, public_url: &str) -> AppResult<Clients> {
        let firebase_idpurl = format!(
            "https://identitytoolkit.googleapis.com/v1/accounts:signInWithIdp?key={}",
            json.get_obj_field("firebase")?.get_str_field("apikey")?
        );

        let client = |provider: ClientProvider| -> AppResult<Option<ProviderClient>> {
            let Some(json) = json.get(provider.slug()) else {
                return Ok(None);
            };
            let (auth_url, token_url) = provider.endpoints();
            let redirect_url = format!("{public_url}/lockin/{}", provider.slug());

            Ok(Some(
                BasicClient::new(ClientId::new(json.get_str_field("client_id")?))
                    .set_client_secret(ClientSecret::new(json.get_str_field("client_secret")?))
                    .set_auth_uri(AuthUrl::new(auth_url.to_owned()).map_err(anyhow::Error::from)?)
                    .set_token_uri(TokenUrl::new(token_url.to_owned()).map_err(anyhow::Error::from)?)
                    .set_redirect_uri(RedirectUrl::new(redirect_url).map_err(anyhow::Error::from)?),
            ))
        };

        Ok(Clients {
            firebase_idpurl: Some(firebase_idpurl),
            google_client: client(ClientProvider::Google)?,
            github_client: client(ClientProvider::Github)?,
        })
    }

    pub fn is_enabled(&self, provider: ClientProvider) -> bool {
        self.firebase_idpurl.is_some() && self.client(provider).is_some()
    }

    fn client(&self, provider: ClientProvider) -> Option<&ProviderClient> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.as_ref(),
            Github => self.github_client.as_ref(),
        }
    }

    pub fn get_client(&self, provider: ClientProvider) -> AppResult<ProviderClient> {
        self.client(provider)
            .cloned()
            .ok_or(format!("OAuth provider {provider} keys not supplied").into())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn providers_are_optional() {
        let json = json!({
            "firebase": { "apikey": "k" },
            "google": { "client_id": "id", "client_secret": "secret" }
        });
        let clients = Clients::from_json(&json, "https://meroghar.example").unwrap();
        assert!(clients.is_enabled(ClientProvider::Google));
        assert!(!clients.is_enabled(ClientProvider::Github));
        assert!(clients.get_client(ClientProvider::Github).is_err());

        let (url, _) = clients
            .get_client(ClientProvider::Google)
            .unwrap()
            .authorize_url(oauth2::CsrfToken::new_random)
            .url();
        assert!(url.as_str().contains("redirect_uri=https%3A%2F%2Fmeroghar.example%2Flockin%2Fgoogle"));
    }

    #[test]
    fn missing_firebase_key_is_an_error() {
        assert!(Clients::from_json(&json!({}), "http://localhost:8080").is_err());
    }

    #[test]
    fn empty_enables_nothing() {
        let clients = Clients::empty();
        for provider in ClientProvider::ALL {
            assert!(!clients.is_enabled(provider));
        }
    }
}
