//! Password sign-in and sign-out against the hosted auth service
//!
//! The auth service itself is out of scope; this module only speaks its
//! token and logout endpoints and turns the answer into an [`AuthSession`].

use crate::config::SupabaseConfig;
use crate::error::{CloverError, Result};
use crate::http;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// Identity of the signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Stable user identifier
    pub id: String,
    /// Email address, when the service reports one
    #[serde(default)]
    pub email: Option<String>,
}

/// A signed-in user plus the bearer credential for their requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    /// Bearer token attached to every store and backend call
    pub access_token: String,
    /// Refresh token, kept so a later version can renew without a password
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// When the access token stops being accepted
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Who the token belongs to
    pub user: AuthUser,
}

impl AuthSession {
    /// Returns `true` once the access token's expiry has passed
    ///
    /// A session without a known expiry is never considered expired; the
    /// remote side is the final judge and answers with 401.
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|at| at <= Utc::now()).unwrap_or(false)
    }

    /// Display label for the user (email when known, id otherwise)
    pub fn user_label(&self) -> &str {
        self.user.email.as_deref().unwrap_or(&self.user.id)
    }
}

/// Service that exchanges credentials for sessions
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Exchange an email and password for a session
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession>;

    /// Invalidate a session remotely
    async fn sign_out(&self, session: &AuthSession) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

/// Client for the auth service's password grant and logout endpoints
#[derive(Debug, Clone)]
pub struct AuthClient {
    client: Client,
    auth_url: String,
    anon_key: String,
}

impl AuthClient {
    /// Create an auth client from the service configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &SupabaseConfig) -> Result<Self> {
        Ok(Self {
            client: http::build_client(config.timeout())?,
            auth_url: config.auth_url(),
            anon_key: config.anon_key.clone(),
        })
    }

    /// Exchange an email and password for a session
    ///
    /// # Errors
    ///
    /// Returns [`CloverError::Authentication`] for rejected credentials,
    /// [`CloverError::Network`] when the service is unreachable, and
    /// [`CloverError::RemoteValidation`] when the answer cannot be parsed.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(CloverError::Authentication(
                "Email and password are required".to_string(),
            ));
        }

        tracing::debug!("Signing in as {}", email);
        let response = self
            .client
            .post(format!("{}/token", self.auth_url))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&PasswordGrant { email, password })
            .send()
            .await
            .map_err(CloverError::from_transport)?;

        let status = response.status();
        let body = http::read_text(response).await?;

        if matches!(
            status,
            StatusCode::BAD_REQUEST
                | StatusCode::UNAUTHORIZED
                | StatusCode::FORBIDDEN
                | StatusCode::UNPROCESSABLE_ENTITY
        ) {
            tracing::warn!("Sign-in rejected for {}: {}", email, status);
            return Err(CloverError::Authentication(auth_error_message(&body)));
        }
        if !status.is_success() {
            return Err(CloverError::from_status(status, &body, "sign in"));
        }

        let session: AuthSession = crate::models::parse_remote(&body, "auth session")?;
        tracing::info!("Signed in as {}", session.user_label());
        Ok(session)
    }

    /// Invalidate a session's token on the auth service
    ///
    /// A token the service no longer recognizes counts as signed out.
    ///
    /// # Errors
    ///
    /// Returns error when the service cannot be reached or answers with an
    /// unexpected failure
    pub async fn sign_out(&self, session: &AuthSession) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/logout", self.auth_url))
            .bearer_auth(&session.access_token)
            .header("apikey", &self.anon_key)
            .send()
            .await
            .map_err(CloverError::from_transport)?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
        ) {
            tracing::debug!("Token already invalid at sign-out ({})", status);
            return Ok(());
        }

        http::check_status(response, "sign out").await?;
        tracing::info!("Signed out {}", session.user_label());
        Ok(())
    }
}

#[async_trait]
impl Authenticator for AuthClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        AuthClient::sign_in(self, email, password).await
    }

    async fn sign_out(&self, session: &AuthSession) -> Result<()> {
        AuthClient::sign_out(self, session).await
    }
}

/// Pull a human-readable message out of an auth error body
fn auth_error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|value| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        })
        .map(str::to_string)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "Sign-in failed. Please check your credentials".to_string()
            } else {
                body.trim().to_string()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_error_contains;
    use chrono::Duration;

    fn session(expires_at: Option<DateTime<Utc>>) -> AuthSession {
        AuthSession {
            access_token: "jwt".to_string(),
            refresh_token: None,
            expires_at,
            user: AuthUser {
                id: "user-1".to_string(),
                email: None,
            },
        }
    }

    #[test]
    fn test_session_parses_token_response() {
        let body = r#"{
            "access_token": "eyJ.abc",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 1893456000,
            "refresh_token": "r-1",
            "user": {"id": "u-1", "email": "sam@example.com", "role": "authenticated"}
        }"#;
        let session: AuthSession = crate::models::parse_remote(body, "auth session").unwrap();
        assert_eq!(session.access_token, "eyJ.abc");
        assert_eq!(session.refresh_token.as_deref(), Some("r-1"));
        assert_eq!(session.user.id, "u-1");
        assert_eq!(session.user_label(), "sam@example.com");
        assert_eq!(session.expires_at.unwrap().timestamp(), 1_893_456_000);
    }

    #[test]
    fn test_session_without_expiry_never_expires() {
        assert!(!session(None).is_expired());
    }

    #[test]
    fn test_session_expiry() {
        assert!(session(Some(Utc::now() - Duration::seconds(1))).is_expired());
        assert!(!session(Some(Utc::now() + Duration::hours(1))).is_expired());
    }

    #[test]
    fn test_user_label_falls_back_to_id() {
        assert_eq!(session(None).user_label(), "user-1");
    }

    #[test]
    fn test_session_roundtrips_for_storage() {
        let original = session(Some(Utc::now() + Duration::hours(1)));
        let json = serde_json::to_string(&original).unwrap();
        let restored: AuthSession = serde_json::from_str(&json).unwrap();
        // Expiry is stored with second precision
        assert_eq!(
            restored.expires_at.unwrap().timestamp(),
            original.expires_at.unwrap().timestamp()
        );
        assert_eq!(restored.user, original.user);
    }

    #[test]
    fn test_auth_error_message_variants() {
        assert_eq!(
            auth_error_message(
                r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#
            ),
            "Invalid login credentials"
        );
        assert_eq!(
            auth_error_message(r#"{"code":400,"msg":"Email not confirmed"}"#),
            "Email not confirmed"
        );
        assert_eq!(auth_error_message("plain text"), "plain text");
        assert!(auth_error_message("").contains("credentials"));
    }

    #[tokio::test]
    async fn test_sign_in_rejects_blank_credentials_without_network() {
        let client = AuthClient::new(&SupabaseConfig::default()).unwrap();
        let err = client.sign_in("  ", "pw").await.unwrap_err();
        assert!(err.requires_reauthentication());
        assert_error_contains(
            client.sign_in("a@b.c", "").await,
            "Email and password are required",
        );
    }
}
