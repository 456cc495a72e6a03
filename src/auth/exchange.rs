//! Token-exchange (security-token-service) client.
//!
//! Two calls are wired: exchanging an identity token for temporary
//! credentials (optionally entering the first role hop in the same
//! request), and assuming a further role with credentials from the
//! previous hop. Both return the same wire shape.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::error::ConnError;
use crate::types::{AuthMechanism, Credentials, RoleHop};
use secrecy::SecretString;

/// Temporary credentials as returned by the exchange service, before
/// the secret is wrapped for the rest of the crate.
#[derive(Clone, Deserialize)]
pub struct ExchangedCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for ExchangedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangedCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl ExchangedCredentials {
    /// Wrap into [`Credentials`], tagging the mechanism that obtained
    /// them.
    pub fn into_credentials(self, issued_via: AuthMechanism) -> Credentials {
        Credentials {
            access_key_id: self.access_key_id,
            secret_access_key: SecretString::from(self.secret_access_key),
            session_token: self.session_token,
            expires_at: self.expiration,
            issued_via,
        }
    }
}

/// Parameters for exchanging an identity token.
pub struct IdentityExchangeRequest<'a> {
    /// Mechanism performing the exchange, used for error attribution.
    pub mechanism: AuthMechanism,
    /// Per-spec endpoint override; falls back to the client's base URL.
    pub endpoint: Option<&'a str>,
    pub identity_token: &'a str,
    pub audience: Option<&'a str>,
    /// First role hop, folded into the exchange call when present.
    pub hop: Option<&'a RoleHop>,
}

/// Parameters for one assume-role hop.
pub struct AssumeRoleRequest<'a> {
    pub mechanism: AuthMechanism,
    pub endpoint: Option<&'a str>,
    /// Credentials from the previous hop, presented as identity evidence.
    pub credentials: &'a ExchangedCredentials,
    pub hop: &'a RoleHop,
}

/// Cloud-provider token-exchange API.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange_identity(
        &self,
        request: IdentityExchangeRequest<'_>,
    ) -> Result<ExchangedCredentials, ConnError>;

    async fn assume_role(
        &self,
        request: AssumeRoleRequest<'_>,
    ) -> Result<ExchangedCredentials, ConnError>;
}

const DEFAULT_EXCHANGE_BASE: &str = "https://sts.cloud.example";
const EXCHANGE_PATH: &str = "/v1/token-exchange";
const ASSUME_ROLE_PATH: &str = "/v1/assume-role";

/// HTTP implementation of [`TokenExchange`] over JSON.
pub struct HttpTokenExchange {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTokenExchange {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_url(http, DEFAULT_EXCHANGE_BASE)
    }

    pub fn with_base_url(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn url(&self, endpoint: Option<&str>, path: &str) -> String {
        let base = endpoint.unwrap_or(&self.base_url);
        format!("{}{}", base.trim_end_matches('/'), path)
    }

    async fn post_for_credentials(
        &self,
        mechanism: AuthMechanism,
        url: String,
        body: serde_json::Value,
    ) -> Result<ExchangedCredentials, ConnError> {
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                ConnError::credential_source(mechanism, format!("exchange request failed: {e}"))
            })?;

        let status = response.status();
        if status.is_client_error() {
            // The service rejected our parameters; retrying the same
            // request cannot succeed.
            let detail = response.text().await.unwrap_or_default();
            return Err(ConnError::Configuration(format!(
                "token exchange rejected ({status}): {detail}"
            )));
        }
        if !status.is_success() {
            return Err(ConnError::credential_source(
                mechanism,
                format!("token exchange returned {status}"),
            ));
        }

        response.json::<ExchangedCredentials>().await.map_err(|e| {
            ConnError::credential_source(mechanism, format!("malformed exchange response: {e}"))
        })
    }
}

fn session_name(hop: &RoleHop) -> String {
    hop.session_name
        .clone()
        .unwrap_or_else(|| format!("cloudconn-{}", uuid::Uuid::new_v4()))
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange_identity(
        &self,
        request: IdentityExchangeRequest<'_>,
    ) -> Result<ExchangedCredentials, ConnError> {
        let mut body = json!({ "identity_token": request.identity_token });
        if let Some(audience) = request.audience {
            body["audience"] = json!(audience);
        }
        if let Some(hop) = request.hop {
            body["role_arn"] = json!(hop.role_arn);
            body["session_name"] = json!(session_name(hop));
            if let Some(external_id) = &hop.external_id {
                body["external_id"] = json!(external_id);
            }
        }
        let url = self.url(request.endpoint, EXCHANGE_PATH);
        self.post_for_credentials(request.mechanism, url, body).await
    }

    async fn assume_role(
        &self,
        request: AssumeRoleRequest<'_>,
    ) -> Result<ExchangedCredentials, ConnError> {
        let mut body = json!({
            "access_key_id": request.credentials.access_key_id,
            "role_arn": request.hop.role_arn,
            "session_name": session_name(request.hop),
        });
        if let Some(token) = &request.credentials.session_token {
            body["session_token"] = json!(token);
        }
        if let Some(external_id) = &request.hop.external_id {
            body["external_id"] = json!(external_id);
        }
        let url = self.url(request.endpoint, ASSUME_ROLE_PATH);
        self.post_for_credentials(request.mechanism, url, body).await
    }
}
