//! Federated-identity mechanism: a platform-provisioned short-lived
//! identity token is exchanged for temporary cloud credentials, then any
//! assume-role hops are applied in order.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ConnError;
use crate::types::{AuthMechanism, AuthSpec, Credentials};

use super::{CredentialSource, IdentityExchangeRequest, TokenExchange};

const FEDERATED_TOKEN_PATH_DEFAULT: &str = "/var/run/identity/token";

pub struct FederatedIdentitySource {
    exchange: Arc<dyn TokenExchange>,
}

impl FederatedIdentitySource {
    pub fn new(exchange: Arc<dyn TokenExchange>) -> Self {
        Self { exchange }
    }
}

#[async_trait]
impl CredentialSource for FederatedIdentitySource {
    async fn obtain(&self, spec: &AuthSpec) -> Result<Credentials, ConnError> {
        let path = spec
            .token_path
            .as_deref()
            .unwrap_or(FEDERATED_TOKEN_PATH_DEFAULT);
        let token = super::read_token_file(path).await?;

        let base = self
            .exchange
            .exchange_identity(IdentityExchangeRequest {
                mechanism: AuthMechanism::FederatedIdentity,
                endpoint: spec.exchange_url.as_deref(),
                identity_token: &token,
                audience: spec.audience.as_deref(),
                hop: None,
            })
            .await?;

        let final_credentials = super::walk_role_chain(
            self.exchange.as_ref(),
            AuthMechanism::FederatedIdentity,
            spec.exchange_url.as_deref(),
            base,
            &spec.role_chain,
        )
        .await?;

        Ok(final_credentials.into_credentials(AuthMechanism::FederatedIdentity))
    }
}
