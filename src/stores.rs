//! External-interface traits for the surrounding system's stores, plus
//! in-memory implementations used by tests and embedders.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ConnError;
use crate::types::{AuthMechanism, ConfigReference, RoleHop};

/// A configuration object as stored by the surrounding system.
///
/// Every field is optional so a delegating child can leave anything to
/// its parent; [`crate::config::ConfigResolver`] flattens the chain and
/// validates the merged result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigObject {
    pub mechanism: Option<AuthMechanism>,
    pub region: Option<String>,
    /// Parent configuration this object inherits defaults from.
    pub delegate_to: Option<ConfigReference>,
    pub endpoints: BTreeMap<String, String>,
    pub role_chain: Vec<RoleHop>,
    pub secret_ref: Option<String>,
    pub token_path: Option<String>,
    pub metadata_url: Option<String>,
    pub exchange_url: Option<String>,
    pub audience: Option<String>,
}

/// Read access to cluster-wide and namespace-local configuration stores.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_cluster(&self, name: &str) -> Result<Option<ConfigObject>, ConnError>;

    async fn get_namespaced(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigObject>, ConnError>;
}

/// Read access to secret payloads referenced by static-secret configs.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, secret_ref: &str) -> Result<Option<Vec<u8>>, ConnError>;
}

/// In-memory [`ConfigStore`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    objects: RwLock<HashMap<(Option<String>, String), ConfigObject>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_cluster(&self, name: impl Into<String>, object: ConfigObject) {
        let mut objects = self.objects.write().expect("config store lock poisoned");
        objects.insert((None, name.into()), object);
    }

    pub fn insert_namespaced(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        object: ConfigObject,
    ) {
        let mut objects = self.objects.write().expect("config store lock poisoned");
        objects.insert((Some(namespace.into()), name.into()), object);
    }

    pub fn remove_cluster(&self, name: &str) {
        let mut objects = self.objects.write().expect("config store lock poisoned");
        objects.remove(&(None, name.to_string()));
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get_cluster(&self, name: &str) -> Result<Option<ConfigObject>, ConnError> {
        let objects = self.objects.read().expect("config store lock poisoned");
        Ok(objects.get(&(None, name.to_string())).cloned())
    }

    async fn get_namespaced(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigObject>, ConnError> {
        let objects = self.objects.read().expect("config store lock poisoned");
        Ok(objects
            .get(&(Some(namespace.to_string()), name.to_string()))
            .cloned())
    }
}

/// In-memory [`SecretStore`].
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, secret_ref: impl Into<String>, payload: impl Into<Vec<u8>>) {
        let mut secrets = self.secrets.write().expect("secret store lock poisoned");
        secrets.insert(secret_ref.into(), payload.into());
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_secret(&self, secret_ref: &str) -> Result<Option<Vec<u8>>, ConnError> {
        let secrets = self.secrets.read().expect("secret store lock poisoned");
        Ok(secrets.get(secret_ref).cloned())
    }
}
