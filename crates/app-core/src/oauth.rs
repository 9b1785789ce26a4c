//! Federated sign-in through OAuth 2.0 authorization-code flows with PKCE.

use std::collections::HashMap;
use std::sync::Arc;

use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl,
    Scope, TokenResponse, TokenUrl,
};
use reqwest::{Client, ClientBuilder, redirect};
use serde::Deserialize;
use thiserror::Error;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Invalid URL format: {0}")]
    InvalidUrl(#[from] oauth2::url::ParseError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("OAuth token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Failed to parse user profile response")]
    ProfileParse,

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),
}

/// Everything needed to send the browser to the provider and to verify the
/// callback afterwards.
#[derive(Debug, Clone)]
pub struct AuthorizationDetails {
    pub url: String,
    pub csrf_state: String,
    pub pkce_verifier: String,
}

/// The identity a provider vouches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedProfile {
    pub subject: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait::async_trait]
pub trait FederatedProvider: Send + Sync {
    fn authorization_details(&self) -> AuthorizationDetails;

    /// Exchanges an authorization code for an access token.
    async fn exchange_code(&self, code: String, pkce_verifier: String) -> Result<String, OAuthError>;

    async fn fetch_profile(&self, access_token: &str) -> Result<FederatedProfile, OAuthError>;
}

#[derive(Debug)]
pub struct GoogleProvider {
    client_id: ClientId,
    client_secret: ClientSecret,
    auth_url: AuthUrl,
    token_url: TokenUrl,
    redirect_url: RedirectUrl,
    http: Client,
}

impl GoogleProvider {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Result<Self, OAuthError> {
        Ok(Self {
            client_id: ClientId::new(client_id),
            client_secret: ClientSecret::new(client_secret),
            auth_url: AuthUrl::new(GOOGLE_AUTH_URL.to_string())?,
            token_url: TokenUrl::new(GOOGLE_TOKEN_URL.to_string())?,
            redirect_url: RedirectUrl::new(redirect_uri)?,
            http: ClientBuilder::new().redirect(redirect::Policy::none()).build()?,
        })
    }
}

#[derive(Deserialize)]
struct GoogleProfile {
    sub: String,
    email: String,
    name: Option<String>,
    picture: Option<String>,
}

#[async_trait::async_trait]
impl FederatedProvider for GoogleProvider {
    fn authorization_details(&self) -> AuthorizationDetails {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_token) = BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_auth_uri(self.auth_url.clone())
            .set_token_uri(self.token_url.clone())
            .set_redirect_uri(self.redirect_url.clone())
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .add_extra_param("prompt", "select_account")
            .set_pkce_challenge(pkce_challenge)
            .url();

        tracing::debug!("generated google authorization url");

        AuthorizationDetails {
            url: auth_url.to_string(),
            csrf_state: csrf_token.secret().to_string(),
            pkce_verifier: pkce_verifier.secret().to_string(),
        }
    }

    async fn exchange_code(&self, code: String, pkce_verifier: String) -> Result<String, OAuthError> {
        let token_result = BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_auth_uri(self.auth_url.clone())
            .set_token_uri(self.token_url.clone())
            .set_redirect_uri(self.redirect_url.clone())
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
            .request_async(&self.http)
            .await
            .map_err(|e| {
                let error_msg = match &e {
                    oauth2::RequestTokenError::ServerResponse(err) => {
                        format!("Server response error: {:?}", err.error_description())
                    },
                    oauth2::RequestTokenError::Parse(_, body) => match std::str::from_utf8(body) {
                        Ok(body_str) => format!("Parse error. Response body: {}", body_str),
                        Err(_) => "Parse error with non-UTF8 response".to_string(),
                    },
                    _ => format!("Token exchange error: {:?}", e),
                };
                tracing::error!("OAuth token exchange failed: {}", error_msg);
                OAuthError::TokenExchange(error_msg)
            })?;

        Ok(token_result.access_token().secret().to_string())
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<FederatedProfile, OAuthError> {
        let profile: GoogleProfile = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?
            .json()
            .await
            .map_err(|_| OAuthError::ProfileParse)?;

        Ok(FederatedProfile {
            subject: profile.sub,
            email: profile.email,
            display_name: profile.name,
            avatar_url: profile.picture,
        })
    }
}

/// Named registry of the federated providers enabled in this deployment.
#[derive(Clone, Default)]
pub struct FederatedProviders {
    providers: HashMap<String, Arc<dyn FederatedProvider>>,
}

impl FederatedProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, provider: Arc<dyn FederatedProvider>) {
        self.providers.insert(name.to_lowercase(), provider);
    }

    pub fn get(&self, name: &str) -> Result<&Arc<dyn FederatedProvider>, OAuthError> {
        self.providers
            .get(&name.to_lowercase())
            .ok_or_else(|| OAuthError::ProviderNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let mut providers = FederatedProviders::new();
        providers.register("Google", Arc::new(MockFederatedProvider::new()));

        assert!(providers.get("google").is_ok());
        assert!(providers.get("GOOGLE").is_ok());
        assert!(matches!(providers.get("github"), Err(OAuthError::ProviderNotFound(name)) if name == "github"));
        assert_eq!(providers.names(), vec!["google"]);
    }

    #[test]
    fn test_google_provider_invalid_redirect_url() {
        let provider = GoogleProvider::new("client_id".into(), "client_secret".into(), "invalid_url".into());

        assert!(matches!(provider.unwrap_err(), OAuthError::InvalidUrl(_)));
    }

    #[test]
    fn test_google_provider_authorization_details() {
        let provider = GoogleProvider::new(
            "client_id".to_string(),
            "client_secret".to_string(),
            "https://portal.example.com/auth/doctors/social/google/callback".to_string(),
        )
        .unwrap();

        let details = provider.authorization_details();

        assert!(details.url.starts_with(GOOGLE_AUTH_URL));
        assert!(details.url.contains("response_type=code"));
        assert!(details.url.contains("client_id=client_id"));
        assert!(details.url.contains("code_challenge_method=S256"));
        assert!(details.url.contains("scope=openid+email+profile"));
        assert!(details.url.contains("prompt=select_account"));
        assert!(details.url.contains(&format!("state={}", details.csrf_state)));
        assert!(!details.pkce_verifier.is_empty());
    }

    #[tokio::test]
    async fn test_mock_provider_flow() {
        let mut provider = MockFederatedProvider::new();
        provider
            .expect_exchange_code()
            .with(eq("code-1".to_string()), eq("verifier-1".to_string()))
            .returning(|_, _| Ok("access-token".to_string()));
        provider.expect_fetch_profile().with(eq("access-token")).returning(|_| {
            Ok(FederatedProfile {
                subject: "g-123".into(),
                email: "ana@example.com".into(),
                display_name: Some("Ana Cruz".into()),
                avatar_url: None,
            })
        });

        let token = provider.exchange_code("code-1".into(), "verifier-1".into()).await.unwrap();
        let profile = provider.fetch_profile(&token).await.unwrap();

        assert_eq!(profile.subject, "g-123");
        assert_eq!(profile.display_name.as_deref(), Some("Ana Cruz"));
    }

    #[tokio::test]
    async fn test_mock_provider_exchange_failure() {
        let mut provider = MockFederatedProvider::new();
        provider
            .expect_exchange_code()
            .returning(|_, _| Err(OAuthError::TokenExchange("invalid_grant".into())));

        let result = provider.exchange_code("bad".into(), "verifier".into()).await;

        assert!(matches!(result, Err(OAuthError::TokenExchange(_))));
    }
}
