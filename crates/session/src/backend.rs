//! HTTP implementation of the [`AuthBackend`] capability.
//!
//! Talks to the thin Caeli auth backend with JSON bodies and the
//! `{success, ..., message?}` response envelope on every route. Exact route
//! paths are deployment configuration ([`BackendRoutes`]); the conventional
//! defaults match the hosted backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::traits::AuthBackend;
use crate::types::{AuthorizationUrl, Session, SessionBundle, User};

/// Route paths, relative to the backend base URL.
#[derive(Debug, Clone)]
pub struct BackendRoutes {
    /// Sign-in URL issuance route.
    pub signin_url: String,
    /// Authorization-code exchange route.
    pub exchange: String,
    /// Session lookup route.
    pub session: String,
    /// Refresh route.
    pub refresh: String,
    /// Remote sign-out route.
    pub sign_out: String,
}

impl Default for BackendRoutes {
    fn default() -> Self {
        Self {
            signin_url: "/auth/signin-url".to_string(),
            exchange: "/auth/exchange".to_string(),
            session: "/auth/session".to_string(),
            refresh: "/auth/refresh".to_string(),
            sign_out: "/auth/signout".to_string(),
        }
    }
}

/// Session fields as the backend sends them.
///
/// `expires_at` may be absent on some provider paths; [`Self::into_session`]
/// derives the absolute expiry in that case.
#[derive(Debug, Deserialize)]
struct SessionPayload {
    access_token: String,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
}

impl SessionPayload {
    fn into_session(self, default_expires_in: i64) -> Session {
        let expires_in = self.expires_in.unwrap_or(default_expires_in);
        Session::new(
            self.access_token,
            self.refresh_token,
            self.token_type.unwrap_or_else(|| "bearer".to_string()),
            expires_in,
            self.expires_at,
        )
    }
}

/// `{success, url?, provider?, message?}` envelope.
#[derive(Debug, Deserialize)]
struct UrlEnvelope {
    success: bool,
    url: Option<String>,
    provider: Option<String>,
    message: Option<String>,
}

/// `{success, session?, user?, message?}` envelope.
#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    success: bool,
    session: Option<SessionPayload>,
    user: Option<User>,
    message: Option<String>,
}

/// `{success, message?}` envelope.
#[derive(Debug, Deserialize)]
struct AckEnvelope {
    success: bool,
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct RedirectBody<'a> {
    #[serde(rename = "redirectUrl")]
    redirect_url: &'a str,
}

#[derive(Debug, Serialize)]
struct CodeBody<'a> {
    code: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshBody<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
}

/// Production [`AuthBackend`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAuthBackend {
    client: Client,
    base_url: String,
    routes: BackendRoutes,
    default_expires_in: i64,
}

impl HttpAuthBackend {
    /// Create a backend client for the configured base URL with default
    /// routes.
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_routes(config, BackendRoutes::default())
    }

    /// Create a backend client with custom route paths.
    #[must_use]
    pub fn with_routes(config: &SessionConfig, routes: BackendRoutes) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            routes,
            default_expires_in: config.default_expires_in,
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    /// Surface a non-2xx response as the given error variant, preserving the
    /// server's `message` when the body is a parseable envelope.
    async fn reject(
        response: reqwest::Response,
        wrap: fn(String) -> SessionError,
    ) -> SessionError {
        let status = response.status();
        let message = match response.json::<AckEnvelope>().await {
            Ok(envelope) => envelope.message.unwrap_or_else(|| status.to_string()),
            Err(_) => status.to_string(),
        };
        wrap(message)
    }

    fn bundle_from(&self, envelope: SessionEnvelope) -> Result<SessionBundle, SessionError> {
        if !envelope.success {
            return Err(SessionError::ExchangeFailed(
                envelope.message.unwrap_or_else(|| "exchange rejected".to_string()),
            ));
        }
        let session = envelope
            .session
            .ok_or_else(|| SessionError::Parse("response missing session".to_string()))?
            .into_session(self.default_expires_in);
        let user = envelope
            .user
            .ok_or_else(|| SessionError::Parse("response missing user".to_string()))?;
        Ok(SessionBundle { session, user })
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn authorization_url(
        &self,
        redirect_uri: &str,
    ) -> Result<AuthorizationUrl, SessionError> {
        debug!(redirect_uri, "requesting authorization URL");

        let response = self
            .client
            .post(self.url(&self.routes.signin_url))
            .json(&RedirectBody { redirect_url: redirect_uri })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::reject(response, SessionError::AuthorizationDenied).await);
        }

        let envelope: UrlEnvelope =
            response.json().await.map_err(|e| SessionError::Parse(e.to_string()))?;

        if !envelope.success {
            return Err(SessionError::AuthorizationDenied(
                envelope.message.unwrap_or_else(|| "sign-in URL refused".to_string()),
            ));
        }

        let url = envelope
            .url
            .ok_or_else(|| SessionError::Parse("response missing url".to_string()))?;
        Ok(AuthorizationUrl { url, provider: envelope.provider })
    }

    async fn exchange_code(&self, code: &str) -> Result<SessionBundle, SessionError> {
        debug!("exchanging authorization code");

        let response = self
            .client
            .post(self.url(&self.routes.exchange))
            .json(&CodeBody { code })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::reject(response, SessionError::ExchangeFailed).await);
        }

        let envelope: SessionEnvelope =
            response.json().await.map_err(|e| SessionError::Parse(e.to_string()))?;
        self.bundle_from(envelope)
    }

    async fn fetch_session(&self, access_token: &str) -> Result<User, SessionError> {
        let response = self
            .client
            .get(self.url(&self.routes.session))
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::reject(response, SessionError::ExchangeFailed).await);
        }

        let envelope: SessionEnvelope =
            response.json().await.map_err(|e| SessionError::Parse(e.to_string()))?;

        if !envelope.success {
            return Err(SessionError::ExchangeFailed(
                envelope.message.unwrap_or_else(|| "session rejected".to_string()),
            ));
        }
        envelope.user.ok_or_else(|| SessionError::Parse("response missing user".to_string()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<SessionBundle, SessionError> {
        debug!("refreshing session");

        let response = self
            .client
            .post(self.url(&self.routes.refresh))
            .json(&RefreshBody { refresh_token })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::reject(response, SessionError::ExchangeFailed).await);
        }

        let envelope: SessionEnvelope =
            response.json().await.map_err(|e| SessionError::Parse(e.to_string()))?;
        self.bundle_from(envelope)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), SessionError> {
        let response = self
            .client
            .post(self.url(&self.routes.sign_out))
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::reject(response, SessionError::ExchangeFailed).await);
        }

        let envelope: AckEnvelope =
            response.json().await.map_err(|e| SessionError::Parse(e.to_string()))?;

        if !envelope.success {
            return Err(SessionError::ExchangeFailed(
                envelope.message.unwrap_or_else(|| "sign-out rejected".to_string()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for route and payload handling. HTTP behaviour is covered
    //! by the wiremock integration tests.
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let config = SessionConfig::new("https://api.caeli.app/", "caeli://auth/callback");
        let backend = HttpAuthBackend::new(&config);

        assert_eq!(backend.url(&backend.routes.refresh), "https://api.caeli.app/auth/refresh");
    }

    #[test]
    fn test_session_payload_defaults() {
        let payload = SessionPayload {
            access_token: "at".to_string(),
            refresh_token: None,
            token_type: None,
            expires_in: None,
            expires_at: None,
        };

        let session = payload.into_session(3600);
        assert_eq!(session.token_type, "bearer");
        assert_eq!(session.expires_in, 3600);
    }

    #[test]
    fn test_explicit_expires_at_survives_payload_conversion() {
        let payload = SessionPayload {
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            token_type: Some("bearer".to_string()),
            expires_in: Some(100),
            expires_at: Some(999),
        };

        let session = payload.into_session(3600);
        assert_eq!(session.expires_at, 999);
        assert_eq!(session.expires_in, 100);
    }
}
