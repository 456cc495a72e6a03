//! Static-secret mechanism: long-lived key material read straight from
//! the secret store. No network call, no expiry.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConnError;
use crate::stores::SecretStore;
use crate::types::{AuthMechanism, AuthSpec, Credentials};

use super::CredentialSource;

/// Expected JSON shape of the referenced secret payload.
#[derive(Deserialize)]
struct SecretPayload {
    access_key_id: String,
    secret_access_key: String,
    #[serde(default)]
    session_token: Option<String>,
}

pub struct StaticSecretSource {
    secrets: Arc<dyn SecretStore>,
}

impl StaticSecretSource {
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self { secrets }
    }
}

#[async_trait]
impl CredentialSource for StaticSecretSource {
    async fn obtain(&self, spec: &AuthSpec) -> Result<Credentials, ConnError> {
        let secret_ref = spec.secret_ref.as_deref().ok_or_else(|| {
            ConnError::Configuration("static-secret spec has no secretRef".into())
        })?;

        let payload = self
            .secrets
            .get_secret(secret_ref)
            .await?
            .ok_or_else(|| {
                ConnError::Configuration(format!("referenced secret \"{secret_ref}\" not found"))
            })?;

        let parsed: SecretPayload = serde_json::from_slice(&payload).map_err(|e| {
            ConnError::Configuration(format!("secret \"{secret_ref}\" payload is malformed: {e}"))
        })?;

        Ok(Credentials {
            access_key_id: parsed.access_key_id,
            secret_access_key: SecretString::from(parsed.secret_access_key),
            session_token: parsed.session_token,
            expires_at: None,
            issued_via: AuthMechanism::StaticSecret,
        })
    }
}
