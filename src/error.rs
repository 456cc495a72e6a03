//! Error taxonomy for credential resolution and client caching.
//!
//! Variants map one-to-one onto the conditions a reconciler has to react
//! to: permanent configuration problems are surfaced as such, transient
//! credential-service failures stay retryable, and nothing in this crate
//! retries internally.

use crate::types::{AuthMechanism, ConfigReference};

/// Errors produced while resolving configuration, obtaining credentials,
/// or serving client handles from the cache.
///
/// The enum is `Clone` so a single failed refresh can be fanned out to
/// every caller waiting on the same cache entry.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnError {
    /// A referenced configuration object does not exist. Permanent until
    /// the reference is fixed.
    #[error("not found: {0}")]
    NotFound(String),

    /// The configuration delegation chain loops back on itself.
    #[error("configuration delegation cycle: {0}")]
    ConfigCycle(String),

    /// Malformed or incomplete configuration or mechanism parameters
    /// (including missing/unreadable identity-token files). Permanent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transient failure obtaining or exchanging credentials. Retryable
    /// through the caller's normal reconciliation backoff.
    #[error("credential source {mechanism:?} failed: {message}")]
    CredentialSource {
        mechanism: AuthMechanism,
        message: String,
    },

    /// A caller waiting on an in-flight refresh exceeded its deadline.
    /// The refresh itself is unaffected. Retryable.
    #[error("timeout: {0}")]
    Timeout(String),
}

impl ConnError {
    /// Shorthand constructor for [`ConnError::CredentialSource`].
    pub fn credential_source(mechanism: AuthMechanism, message: impl Into<String>) -> Self {
        Self::CredentialSource {
            mechanism,
            message: message.into(),
        }
    }

    /// Whether the caller should expect a later attempt to succeed
    /// without a configuration change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CredentialSource { .. } | Self::Timeout(_))
    }

    /// Append the offending configuration reference for diagnostics,
    /// keeping the error kind intact.
    pub fn annotate(self, reference: &ConfigReference) -> Self {
        match self {
            Self::NotFound(m) => Self::NotFound(format!("{m} [reference {reference}]")),
            Self::ConfigCycle(m) => Self::ConfigCycle(format!("{m} [reference {reference}]")),
            Self::Configuration(m) => Self::Configuration(format!("{m} [reference {reference}]")),
            Self::CredentialSource { mechanism, message } => Self::CredentialSource {
                mechanism,
                message: format!("{message} [reference {reference}]"),
            },
            Self::Timeout(m) => Self::Timeout(format!("{m} [reference {reference}]")),
        }
    }
}
