//! Credential sources: one implementation per authentication mechanism,
//! selected by the resolved spec's `mechanism` field.
//!
//! Sources fail fast. Transient network/service failures surface as
//! [`ConnError::CredentialSource`]; malformed or missing inputs (secret
//! payloads, token files) surface as [`ConnError::Configuration`].
//! Retry policy belongs to the caller.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ConnError;
use crate::stores::SecretStore;
use crate::types::{AuthMechanism, AuthSpec, Credentials};

pub mod exchange;
mod federated;
mod platform;
mod static_secret;
mod web_identity;

pub use exchange::{
    AssumeRoleRequest, ExchangedCredentials, HttpTokenExchange, IdentityExchangeRequest,
    TokenExchange,
};
pub use federated::FederatedIdentitySource;
pub use platform::PlatformIdentitySource;
pub use static_secret::StaticSecretSource;
pub use web_identity::WebIdentitySource;

/// Materializes credentials for a resolved authentication spec.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn obtain(&self, spec: &AuthSpec) -> Result<Credentials, ConnError>;
}

/// Owns one source per mechanism and dispatches on `spec.mechanism`.
pub struct CredentialSources {
    static_secret: StaticSecretSource,
    federated: FederatedIdentitySource,
    platform: PlatformIdentitySource,
    web_identity: WebIdentitySource,
}

impl CredentialSources {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        exchange: Arc<dyn TokenExchange>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            static_secret: StaticSecretSource::new(secrets),
            federated: FederatedIdentitySource::new(Arc::clone(&exchange)),
            platform: PlatformIdentitySource::new(http),
            web_identity: WebIdentitySource::new(exchange),
        }
    }

    pub fn select(&self, mechanism: AuthMechanism) -> &dyn CredentialSource {
        match mechanism {
            AuthMechanism::StaticSecret => &self.static_secret,
            AuthMechanism::FederatedIdentity => &self.federated,
            AuthMechanism::PlatformIdentity => &self.platform,
            AuthMechanism::WebIdentityToken => &self.web_identity,
        }
    }
}

#[async_trait]
impl CredentialSource for CredentialSources {
    async fn obtain(&self, spec: &AuthSpec) -> Result<Credentials, ConnError> {
        self.select(spec.mechanism).obtain(spec).await
    }
}

/// Apply assume-role hops sequentially: each hop's output credentials
/// become the identity evidence for the next.
pub(crate) async fn walk_role_chain(
    exchange: &dyn TokenExchange,
    mechanism: AuthMechanism,
    endpoint: Option<&str>,
    mut current: ExchangedCredentials,
    hops: &[crate::types::RoleHop],
) -> Result<ExchangedCredentials, ConnError> {
    for hop in hops {
        current = exchange
            .assume_role(AssumeRoleRequest {
                mechanism,
                endpoint,
                credentials: &current,
                hop,
            })
            .await?;
    }
    Ok(current)
}

/// Read an identity-token file, treating absence or emptiness as a
/// permanent configuration problem.
pub(crate) async fn read_token_file(path: &str) -> Result<String, ConnError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConnError::Configuration(format!("cannot read token file {path}: {e}")))?;
    let token = raw.trim();
    if token.is_empty() {
        return Err(ConnError::Configuration(format!(
            "token file {path} is empty"
        )));
    }
    Ok(token.to_string())
}
