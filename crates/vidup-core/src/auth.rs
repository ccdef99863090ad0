//! Access-token collaborators.
//!
//! The controller asks for the current bearer token before every exchange and
//! calls [`AuthProvider::refresh_access_token`] at most once per session, when
//! the retry policy returns `RefreshAuthAndRetry` for a 401.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, Mutex};

use crate::transport::{HttpRequest, HttpTransport, Method};

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Token for the `Authorization: Bearer` header; `None` sends no header.
    fn access_token(&self) -> Option<String>;

    /// Obtain a fresh access token; later `access_token()` calls return it.
    async fn refresh_access_token(&self) -> Result<String>;
}

/// Fixed token with no way to refresh it.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

#[async_trait]
impl AuthProvider for StaticToken {
    fn access_token(&self) -> Option<String> {
        self.0.clone()
    }

    async fn refresh_access_token(&self) -> Result<String> {
        bail!("no refresh token configured")
    }
}

#[derive(Debug, Clone)]
struct Tokens {
    access: String,
    refresh: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// OAuth2 `refresh_token` grant against `POST /api/v1/users/token`.
pub struct OAuthRefresher {
    transport: Arc<dyn HttpTransport>,
    token_url: String,
    client_id: String,
    client_secret: String,
    tokens: Mutex<Tokens>,
}

impl OAuthRefresher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        server_url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Result<Self> {
        let token_url = url::Url::parse(server_url)
            .and_then(|u| u.join("/api/v1/users/token"))
            .with_context(|| format!("invalid server URL {}", server_url))?;
        Ok(Self {
            transport,
            token_url: token_url.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            tokens: Mutex::new(Tokens {
                access: access_token.into(),
                refresh: refresh_token.into(),
            }),
        })
    }
}

#[async_trait]
impl AuthProvider for OAuthRefresher {
    fn access_token(&self) -> Option<String> {
        let tokens = self.tokens.lock().expect("token lock poisoned");
        Some(tokens.access.clone())
    }

    async fn refresh_access_token(&self) -> Result<String> {
        let refresh = self.tokens.lock().expect("token lock poisoned").refresh.clone();
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", &self.client_secret)
            .append_pair("grant_type", "refresh_token")
            .append_pair("refresh_token", &refresh)
            .finish();
        let request = HttpRequest::new(Method::Post, self.token_url.clone())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body.into_bytes());

        let response = self
            .transport
            .execute(request)
            .await
            .context("token refresh request")?;
        if !response.is_success() {
            bail!(
                "token refresh returned HTTP {}: {}",
                response.status,
                response.body_snippet()
            );
        }
        let parsed: TokenResponse =
            serde_json::from_slice(&response.body).context("parse token response")?;

        let mut tokens = self.tokens.lock().expect("token lock poisoned");
        tokens.access = parsed.access_token.clone();
        if let Some(r) = parsed.refresh_token {
            tokens.refresh = r;
        }
        tracing::info!("access token refreshed");
        Ok(parsed.access_token)
    }
}
