//! Core data model: configuration references, resolved authentication
//! specs, credentials, and cache fingerprints.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Scope of a configuration object: shared across the cluster or local
/// to a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfigScope {
    Cluster,
    Namespaced,
}

impl Default for ConfigScope {
    fn default() -> Self {
        Self::Cluster
    }
}

/// Identifies exactly one configuration object.
///
/// `namespace` is meaningful only when `scope` is
/// [`ConfigScope::Namespaced`]; resolution fails with a configuration
/// error when the two disagree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigReference {
    pub name: String,
    #[serde(default)]
    pub scope: ConfigScope,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl ConfigReference {
    /// Reference a cluster-scoped configuration object.
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: ConfigScope::Cluster,
            namespace: None,
        }
    }

    /// Reference a namespaced configuration object.
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: ConfigScope::Namespaced,
            namespace: Some(namespace.into()),
        }
    }
}

impl fmt::Display for ConfigReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.scope, &self.namespace) {
            (ConfigScope::Namespaced, Some(ns)) => write!(f, "{}/{}", ns, self.name),
            (ConfigScope::Namespaced, None) => write!(f, "?/{}", self.name),
            (ConfigScope::Cluster, _) => write!(f, "cluster/{}", self.name),
        }
    }
}

/// How credentials for a resolved configuration are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthMechanism {
    /// Long-lived key material read from a secret store.
    StaticSecret,
    /// Platform-provisioned identity token exchanged for temporary
    /// credentials.
    FederatedIdentity,
    /// Auto-rotating credentials served by a platform metadata endpoint.
    PlatformIdentity,
    /// Externally-issued OIDC token exchanged via
    /// assume-role-with-web-identity.
    WebIdentityToken,
}

/// One hop in an assume-role chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleHop {
    pub role_arn: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub session_name: Option<String>,
}

impl RoleHop {
    pub fn new(role_arn: impl Into<String>) -> Self {
        Self {
            role_arn: role_arn.into(),
            external_id: None,
            session_name: None,
        }
    }
}

/// Fully-resolved, flattened authentication spec.
///
/// Produced fresh by [`crate::config::ConfigResolver`] on every
/// resolution and never mutated afterwards; a change in the underlying
/// configuration yields a new spec (and therefore a new fingerprint).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthSpec {
    pub mechanism: AuthMechanism,
    pub region: Option<String>,
    /// Service-name → URL overrides, ordered for stable hashing.
    pub endpoints: BTreeMap<String, String>,
    /// Role hops applied in declaration order (parent entries first).
    pub role_chain: Vec<RoleHop>,
    /// Secret-store reference (static-secret mechanism).
    pub secret_ref: Option<String>,
    /// Identity-token file path (federated / web-identity mechanisms).
    pub token_path: Option<String>,
    /// Platform metadata endpoint override (platform-identity mechanism).
    pub metadata_url: Option<String>,
    /// Token-exchange service endpoint override.
    pub exchange_url: Option<String>,
    /// Audience claim requested during token exchange.
    pub audience: Option<String>,
}

impl AuthSpec {
    /// Minimal spec for a mechanism, everything else defaulted.
    pub fn for_mechanism(mechanism: AuthMechanism) -> Self {
        Self {
            mechanism,
            region: None,
            endpoints: BTreeMap::new(),
            role_chain: Vec::new(),
            secret_ref: None,
            token_path: None,
            metadata_url: None,
            exchange_url: None,
            audience: None,
        }
    }

    /// Stable structural hash over every field, order-sensitive for the
    /// role chain. Structurally-equal specs always fingerprint alike.
    pub fn fingerprint(&self) -> Fingerprint {
        // DefaultHasher::new() uses fixed keys, so fingerprints are
        // deterministic within a process. The cache is in-memory only;
        // cross-process stability is not required.
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        Fingerprint(hasher.finish())
    }
}

/// Cache key derived from an [`AuthSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub(crate) u64);

impl Fingerprint {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Materialized signing material plus its validity window.
///
/// Owned by the cache entry that produced it; a refresh publishes a new
/// value rather than editing this one in place.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    /// Secret signing material; never printed by `Debug`.
    pub secret_access_key: SecretString,
    pub session_token: Option<String>,
    /// `None` means the credentials never expire.
    pub expires_at: Option<DateTime<Utc>>,
    pub issued_via: AuthMechanism,
}
