//! Client cache keyed by authentication-spec fingerprint.
//!
//! Serves cached handles while credentials are comfortably inside their
//! validity window, refreshes proactively once the refresh margin is
//! reached, and guarantees at most one in-flight refresh per fingerprint
//! no matter how many callers arrive concurrently. Failed refreshes are
//! never cached.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::auth::CredentialSource;
use crate::client::ClientHandle;
use crate::error::ConnError;
use crate::types::{AuthSpec, Fingerprint};

/// Operational tuning for the cache. Values are deployment inputs, not
/// behavioral constants.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Proactive-refresh buffer before credential expiry.
    pub refresh_margin: Duration,
    /// How long a caller waits on another caller's in-flight refresh.
    pub wait_timeout: Duration,
    /// Evict entries unused for this long. `None` disables idle expiry.
    pub idle_ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_margin: Duration::from_secs(300),
            wait_timeout: Duration::from_secs(30),
            idle_ttl: None,
        }
    }
}

type RefreshResult = Option<Result<ClientHandle, ConnError>>;

enum Slot {
    Ready(ReadyEntry),
    Refreshing {
        generation: u64,
        rx: watch::Receiver<RefreshResult>,
    },
}

struct ReadyEntry {
    handle: ClientHandle,
    expires_at: Option<DateTime<Utc>>,
    last_used: Instant,
}

enum Action {
    Hit(ClientHandle),
    Wait(watch::Receiver<RefreshResult>),
    Lead {
        generation: u64,
        tx: watch::Sender<RefreshResult>,
    },
}

/// Fingerprint-keyed cache of live client handles.
///
/// The cache is the only shared mutable state in the crate; the inner
/// map lock is held only for bookkeeping, never across a credential
/// round-trip.
pub struct ClientCache {
    entries: Mutex<HashMap<Fingerprint, Slot>>,
    sources: Arc<dyn CredentialSource>,
    http: reqwest::Client,
    config: CacheConfig,
    generations: AtomicU64,
}

impl ClientCache {
    pub fn new(config: CacheConfig, sources: Arc<dyn CredentialSource>, http: reqwest::Client) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            sources,
            http,
            config,
            generations: AtomicU64::new(1),
        }
    }

    /// Return a valid client handle for `spec`, refreshing credentials
    /// when missing or inside the refresh margin.
    ///
    /// Exactly one caller performs the refresh for a fingerprint; the
    /// rest suspend on its outcome, bounded by `wait_timeout`. A waiter
    /// that times out or is cancelled detaches without affecting the
    /// refresh.
    pub async fn get_or_refresh(&self, spec: &AuthSpec) -> Result<ClientHandle, ConnError> {
        let fingerprint = spec.fingerprint();
        loop {
            let action = {
                let mut entries = self.entries.lock().expect("cache lock poisoned");
                self.sweep_idle(&mut entries);
                match entries.get_mut(&fingerprint) {
                    Some(Slot::Ready(entry))
                        if is_fresh(entry.expires_at, self.config.refresh_margin) =>
                    {
                        entry.last_used = Instant::now();
                        Action::Hit(entry.handle.clone())
                    }
                    // A live refresh to piggyback on. A closed sender
                    // means its leader was cancelled mid-flight; fall
                    // through and take over.
                    Some(Slot::Refreshing { rx, .. }) if rx.has_changed().is_ok() => {
                        Action::Wait(rx.clone())
                    }
                    _ => {
                        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
                        let (tx, rx) = watch::channel(None);
                        entries.insert(fingerprint, Slot::Refreshing { generation, rx });
                        Action::Lead { generation, tx }
                    }
                }
            };

            match action {
                Action::Hit(handle) => return Ok(handle),
                Action::Wait(mut rx) => {
                    let waited = tokio::time::timeout(
                        self.config.wait_timeout,
                        rx.wait_for(|outcome| outcome.is_some()),
                    )
                    .await;
                    match waited {
                        Err(_) => {
                            return Err(ConnError::Timeout(format!(
                                "waited {:?} for in-flight credential refresh of {fingerprint}",
                                self.config.wait_timeout
                            )));
                        }
                        // Leader dropped without publishing; retry.
                        Ok(Err(_)) => continue,
                        Ok(Ok(outcome)) => match (*outcome).clone() {
                            Some(result) => return result,
                            None => continue,
                        },
                    }
                }
                Action::Lead { generation, tx } => {
                    return self.refresh(spec, fingerprint, generation, tx).await;
                }
            }
        }
    }

    /// Remove an entry unconditionally, e.g. when the underlying
    /// configuration object changed or was deleted. An in-flight refresh
    /// of the same fingerprint notices and discards its result.
    pub fn invalidate(&self, fingerprint: Fingerprint) -> bool {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let removed = entries.remove(&fingerprint).is_some();
        if removed {
            tracing::debug!(%fingerprint, "cache entry invalidated");
        }
        removed
    }

    /// Convenience wrapper over [`ClientCache::invalidate`].
    pub fn invalidate_spec(&self, spec: &AuthSpec) -> bool {
        self.invalidate(spec.fingerprint())
    }

    pub fn contains(&self, fingerprint: Fingerprint) -> bool {
        let entries = self.entries.lock().expect("cache lock poisoned");
        entries.contains_key(&fingerprint)
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.lock().expect("cache lock poisoned");
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn refresh(
        &self,
        spec: &AuthSpec,
        fingerprint: Fingerprint,
        generation: u64,
        tx: watch::Sender<RefreshResult>,
    ) -> Result<ClientHandle, ConnError> {
        tracing::debug!(%fingerprint, mechanism = ?spec.mechanism, "refreshing credentials");
        let result = self
            .sources
            .obtain(spec)
            .await
            .map(|credentials| ClientHandle::new(self.http.clone(), spec, credentials));

        {
            let mut entries = self.entries.lock().expect("cache lock poisoned");
            let still_ours = matches!(
                entries.get(&fingerprint),
                Some(Slot::Refreshing { generation: g, .. }) if *g == generation
            );
            if still_ours {
                match &result {
                    Ok(handle) => {
                        entries.insert(
                            fingerprint,
                            Slot::Ready(ReadyEntry {
                                handle: handle.clone(),
                                expires_at: handle.credentials().expires_at,
                                last_used: Instant::now(),
                            }),
                        );
                    }
                    Err(error) => {
                        // Failures are never cached; the next caller
                        // starts a clean attempt.
                        tracing::warn!(%fingerprint, %error, "credential refresh failed");
                        entries.remove(&fingerprint);
                    }
                }
            } else {
                tracing::debug!(%fingerprint, "entry invalidated during refresh; discarding result");
            }
        }

        // Waiters get the outcome even when the slot was invalidated.
        let _ = tx.send(Some(result.clone()));
        result
    }

    fn sweep_idle(&self, entries: &mut HashMap<Fingerprint, Slot>) {
        let Some(idle_ttl) = self.config.idle_ttl else {
            return;
        };
        entries.retain(|_, slot| match slot {
            Slot::Ready(entry) => entry.last_used.elapsed() < idle_ttl,
            Slot::Refreshing { .. } => true,
        });
    }
}

fn is_fresh(expires_at: Option<DateTime<Utc>>, margin: Duration) -> bool {
    match expires_at {
        None => true,
        Some(at) => match (at - Utc::now()).to_std() {
            Ok(remaining) => remaining > margin,
            // Already past expiry.
            Err(_) => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn non_expiring_credentials_are_always_fresh() {
        assert!(is_fresh(None, Duration::from_secs(300)));
    }

    #[test]
    fn freshness_respects_the_margin() {
        let in_twenty = Utc::now() + ChronoDuration::seconds(20);
        assert!(is_fresh(Some(in_twenty), Duration::from_secs(10)));
        assert!(!is_fresh(Some(in_twenty), Duration::from_secs(30)));
    }

    #[test]
    fn expired_credentials_are_stale() {
        let past = Utc::now() - ChronoDuration::seconds(5);
        assert!(!is_fresh(Some(past), Duration::from_secs(0)));
    }
}
