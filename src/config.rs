//! Configuration resolution: fetches a referenced configuration object,
//! follows its delegation chain, and flattens the result into an
//! immutable [`AuthSpec`].
//!
//! Merge semantics are child-overrides-parent field-by-field, except the
//! assume-role chain which is appended parent-first so role assumption
//! happens in declaration order.

use std::sync::Arc;

use crate::error::ConnError;
use crate::stores::{ConfigObject, ConfigStore};
use crate::types::{AuthSpec, ConfigReference, ConfigScope};

/// Resolves configuration references into flattened authentication specs.
///
/// Purely a read-side transformation; the resolver holds no mutable
/// state beyond its store handle.
pub struct ConfigResolver {
    store: Arc<dyn ConfigStore>,
}

impl ConfigResolver {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Resolve `reference` into a flattened [`AuthSpec`].
    ///
    /// Follows `delegate_to` links iteratively, tracking visited objects
    /// so a delegation cycle fails with [`ConnError::ConfigCycle`]
    /// instead of looping.
    pub async fn resolve(&self, reference: &ConfigReference) -> Result<AuthSpec, ConnError> {
        // Child first; merged parent-first below.
        let mut chain: Vec<ConfigObject> = Vec::new();
        let mut visited: Vec<String> = Vec::new();
        let mut cursor = Some(reference.clone());

        while let Some(current) = cursor {
            let key = chain_key(&current);
            if visited.iter().any(|seen| *seen == key) {
                return Err(ConnError::ConfigCycle(format!(
                    "{} -> {}",
                    visited.join(" -> "),
                    key
                )));
            }
            let object = self.fetch(&current).await?;
            visited.push(key);
            cursor = object.delegate_to.clone();
            chain.push(object);
        }

        let mut merged = ConfigObject::default();
        for object in chain.iter().rev() {
            merge_over(&mut merged, object);
        }
        tracing::debug!(reference = %reference, depth = chain.len(), "resolved configuration");
        into_spec(merged)
    }

    async fn fetch(&self, reference: &ConfigReference) -> Result<ConfigObject, ConnError> {
        let found = match reference.scope {
            ConfigScope::Cluster => self.store.get_cluster(&reference.name).await?,
            ConfigScope::Namespaced => {
                let namespace = reference.namespace.as_deref().ok_or_else(|| {
                    ConnError::Configuration(format!(
                        "namespaced configuration reference \"{}\" has no namespace",
                        reference.name
                    ))
                })?;
                self.store.get_namespaced(namespace, &reference.name).await?
            }
        };
        found.ok_or_else(|| {
            ConnError::NotFound(format!(
                "configuration object \"{}\" not found",
                chain_key(reference)
            ))
        })
    }
}

fn chain_key(reference: &ConfigReference) -> String {
    match (&reference.scope, &reference.namespace) {
        (ConfigScope::Namespaced, Some(ns)) => format!("{}/{}", ns, reference.name),
        _ => format!("cluster/{}", reference.name),
    }
}

/// Overlay `child` on top of `merged` (which already holds the parent
/// side). Scalars replace when present; endpoint overrides merge
/// key-wise with the child winning; role-chain entries append.
fn merge_over(merged: &mut ConfigObject, child: &ConfigObject) {
    if child.mechanism.is_some() {
        merged.mechanism = child.mechanism;
    }
    if child.region.is_some() {
        merged.region = child.region.clone();
    }
    if child.secret_ref.is_some() {
        merged.secret_ref = child.secret_ref.clone();
    }
    if child.token_path.is_some() {
        merged.token_path = child.token_path.clone();
    }
    if child.metadata_url.is_some() {
        merged.metadata_url = child.metadata_url.clone();
    }
    if child.exchange_url.is_some() {
        merged.exchange_url = child.exchange_url.clone();
    }
    if child.audience.is_some() {
        merged.audience = child.audience.clone();
    }
    for (service, url) in &child.endpoints {
        merged.endpoints.insert(service.clone(), url.clone());
    }
    merged.role_chain.extend(child.role_chain.iter().cloned());
}

fn into_spec(merged: ConfigObject) -> Result<AuthSpec, ConnError> {
    let mechanism = merged.mechanism.ok_or_else(|| {
        ConnError::Configuration("no authentication mechanism set anywhere in the chain".into())
    })?;

    let spec = AuthSpec {
        mechanism,
        region: merged.region,
        endpoints: merged.endpoints,
        role_chain: merged.role_chain,
        secret_ref: merged.secret_ref,
        token_path: merged.token_path,
        metadata_url: merged.metadata_url,
        exchange_url: merged.exchange_url,
        audience: merged.audience,
    };

    // Mechanism parameters that must exist before any caller spends a
    // credential round-trip on them.
    match spec.mechanism {
        crate::types::AuthMechanism::StaticSecret if spec.secret_ref.is_none() => Err(
            ConnError::Configuration("static-secret mechanism requires secretRef".into()),
        ),
        crate::types::AuthMechanism::WebIdentityToken if spec.token_path.is_none() => Err(
            ConnError::Configuration("web-identity mechanism requires tokenPath".into()),
        ),
        _ => Ok(spec),
    }
}
