//! Platform-identity mechanism: credentials served by a platform-local
//! metadata endpoint that rotates them automatically.

use async_trait::async_trait;

use crate::error::ConnError;
use crate::types::{AuthMechanism, AuthSpec, Credentials};

use super::{CredentialSource, ExchangedCredentials};

const METADATA_URL_DEFAULT: &str = "http://169.254.169.254/v1/identity/credentials";
const METADATA_HEADER: &str = "Metadata-Flavor";
const METADATA_HEADER_VALUE: &str = "Platform";

pub struct PlatformIdentitySource {
    http: reqwest::Client,
}

impl PlatformIdentitySource {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl CredentialSource for PlatformIdentitySource {
    async fn obtain(&self, spec: &AuthSpec) -> Result<Credentials, ConnError> {
        let url = spec.metadata_url.as_deref().unwrap_or(METADATA_URL_DEFAULT);

        let response = self
            .http
            .get(url)
            .header(METADATA_HEADER, METADATA_HEADER_VALUE)
            .send()
            .await
            .map_err(|e| {
                ConnError::credential_source(
                    AuthMechanism::PlatformIdentity,
                    format!("metadata endpoint request failed: {e}"),
                )
            })?;

        if !response.status().is_success() {
            return Err(ConnError::credential_source(
                AuthMechanism::PlatformIdentity,
                format!("metadata endpoint returned {}", response.status()),
            ));
        }

        let exchanged: ExchangedCredentials = response.json().await.map_err(|e| {
            ConnError::credential_source(
                AuthMechanism::PlatformIdentity,
                format!("malformed metadata response: {e}"),
            )
        })?;

        tracing::debug!(
            expires_at = ?exchanged.expiration,
            "obtained platform-identity credentials"
        );
        Ok(exchanged.into_credentials(AuthMechanism::PlatformIdentity))
    }
}
