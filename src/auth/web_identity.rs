//! Web-identity mechanism: an externally-issued OIDC token is presented
//! via assume-role-with-web-identity. The first role hop rides the
//! exchange call itself; remaining hops are assumed sequentially with
//! each hop's output as the next hop's input.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ConnError;
use crate::types::{AuthMechanism, AuthSpec, Credentials};

use super::{CredentialSource, IdentityExchangeRequest, TokenExchange};

pub struct WebIdentitySource {
    exchange: Arc<dyn TokenExchange>,
}

impl WebIdentitySource {
    pub fn new(exchange: Arc<dyn TokenExchange>) -> Self {
        Self { exchange }
    }
}

#[async_trait]
impl CredentialSource for WebIdentitySource {
    async fn obtain(&self, spec: &AuthSpec) -> Result<Credentials, ConnError> {
        let path = spec.token_path.as_deref().ok_or_else(|| {
            ConnError::Configuration("web-identity spec has no tokenPath".into())
        })?;
        let token = super::read_token_file(path).await?;

        let first = self
            .exchange
            .exchange_identity(IdentityExchangeRequest {
                mechanism: AuthMechanism::WebIdentityToken,
                endpoint: spec.exchange_url.as_deref(),
                identity_token: &token,
                audience: spec.audience.as_deref(),
                hop: spec.role_chain.first(),
            })
            .await?;

        let remaining = if spec.role_chain.is_empty() {
            &[]
        } else {
            &spec.role_chain[1..]
        };
        let final_credentials = super::walk_role_chain(
            self.exchange.as_ref(),
            AuthMechanism::WebIdentityToken,
            spec.exchange_url.as_deref(),
            first,
            remaining,
        )
        .await?;

        Ok(final_credentials.into_credentials(AuthMechanism::WebIdentityToken))
    }
}
