//! Client handles: a ready-to-use API client bound to a region, endpoint
//! overrides, and one immutable set of credentials.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::types::{AuthSpec, Credentials};

/// Cheaply-clonable handle to a constructed cloud client.
///
/// All clones of one handle share the same underlying client; the cache
/// hands the identical instance to every caller of a fingerprint, which
/// is what [`ClientHandle::same_instance`] observes.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    inner: Arc<CloudClient>,
}

#[derive(Debug)]
struct CloudClient {
    http: reqwest::Client,
    region: Option<String>,
    endpoints: BTreeMap<String, String>,
    credentials: Credentials,
}

impl ClientHandle {
    /// Bind a new client to freshly-obtained credentials.
    pub fn new(http: reqwest::Client, spec: &AuthSpec, credentials: Credentials) -> Self {
        Self {
            inner: Arc::new(CloudClient {
                http,
                region: spec.region.clone(),
                endpoints: spec.endpoints.clone(),
                credentials,
            }),
        }
    }

    /// Whether two handles are the same underlying client instance.
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub fn region(&self) -> Option<&str> {
        self.inner.region.as_deref()
    }

    /// Endpoint override for a service, if one is configured.
    pub fn endpoint_for(&self, service: &str) -> Option<&str> {
        self.inner.endpoints.get(service).map(String::as_str)
    }

    pub fn credentials(&self) -> &Credentials {
        &self.inner.credentials
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AuthMechanism;
    use secrecy::SecretString;

    fn handle() -> ClientHandle {
        let mut spec = AuthSpec::for_mechanism(AuthMechanism::StaticSecret);
        spec.region = Some("us-west-1".into());
        spec.endpoints
            .insert("storage".into(), "https://storage.local".into());
        ClientHandle::new(
            reqwest::Client::new(),
            &spec,
            Credentials {
                access_key_id: "AKID".into(),
                secret_access_key: SecretString::from("sk".to_string()),
                session_token: None,
                expires_at: None,
                issued_via: AuthMechanism::StaticSecret,
            },
        )
    }

    #[test]
    fn clones_are_the_same_instance() {
        let a = handle();
        let b = a.clone();
        assert!(a.same_instance(&b));
        assert!(!a.same_instance(&handle()));
    }

    #[test]
    fn endpoint_overrides_resolve_by_service() {
        let h = handle();
        assert_eq!(h.endpoint_for("storage"), Some("https://storage.local"));
        assert_eq!(h.endpoint_for("queue"), None);
        assert_eq!(h.region(), Some("us-west-1"));
    }
}
