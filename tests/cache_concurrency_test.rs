//! Concurrency and lifecycle tests for the client cache: single-flight
//! refresh, failure fan-out, invalidation, and refresh-margin behavior.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use tokio_test::assert_ok;

use cloudconn::auth::CredentialSource;
use cloudconn::{
    AuthMechanism, AuthSpec, CacheConfig, ClientCache, ConnError, Credentials,
};

/// Scripted credential source: counts calls, optionally fails the first
/// N attempts, optionally delays, optionally issues expiring credentials.
struct ScriptedSource {
    calls: AtomicUsize,
    fail_first: usize,
    delay: Duration,
    ttl: Option<chrono::Duration>,
}

impl ScriptedSource {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first: 0,
            delay: Duration::from_millis(0),
            ttl: None,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for ScriptedSource {
    async fn obtain(&self, spec: &AuthSpec) -> Result<Credentials, ConnError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if call < self.fail_first {
            return Err(ConnError::credential_source(
                spec.mechanism,
                "scripted transient failure",
            ));
        }
        Ok(Credentials {
            access_key_id: format!("AKID-{call}"),
            secret_access_key: SecretString::from("sk".to_string()),
            session_token: None,
            expires_at: self.ttl.map(|ttl| Utc::now() + ttl),
            issued_via: spec.mechanism,
        })
    }
}

fn spec() -> AuthSpec {
    let mut spec = AuthSpec::for_mechanism(AuthMechanism::StaticSecret);
    spec.region = Some("us-west-1".into());
    spec.secret_ref = Some("creds".into());
    spec
}

fn cache_with(config: CacheConfig, source: Arc<ScriptedSource>) -> Arc<ClientCache> {
    Arc::new(ClientCache::new(config, source, reqwest::Client::new()))
}

#[tokio::test]
async fn fifty_concurrent_callers_trigger_one_obtain() {
    let source = Arc::new(ScriptedSource {
        delay: Duration::from_millis(50),
        ..ScriptedSource::new()
    });
    let cache = cache_with(CacheConfig::default(), Arc::clone(&source));

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let cache = Arc::clone(&cache);
        tasks.push(tokio::spawn(
            async move { cache.get_or_refresh(&spec()).await },
        ));
    }

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap().unwrap());
    }

    assert_eq!(source.calls(), 1, "exactly one refresh must run");
    let first = &handles[0];
    assert!(handles.iter().all(|h| h.same_instance(first)));
}

#[tokio::test]
async fn structurally_equal_specs_share_one_entry() {
    let source = Arc::new(ScriptedSource::new());
    let cache = cache_with(CacheConfig::default(), Arc::clone(&source));

    let a = cache.get_or_refresh(&spec()).await.unwrap();
    let b = cache.get_or_refresh(&spec()).await.unwrap();

    assert!(a.same_instance(&b));
    assert_eq!(source.calls(), 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn invalidate_forces_a_fresh_obtain() {
    let source = Arc::new(ScriptedSource::new());
    let cache = cache_with(CacheConfig::default(), Arc::clone(&source));

    let first = cache.get_or_refresh(&spec()).await.unwrap();
    assert!(cache.invalidate_spec(&spec()));
    assert!(cache.is_empty());

    let second = cache.get_or_refresh(&spec()).await.unwrap();
    assert_eq!(source.calls(), 2);
    assert!(!first.same_instance(&second));
}

#[tokio::test]
async fn failed_refresh_is_not_cached() {
    let source = Arc::new(ScriptedSource {
        fail_first: 1,
        ..ScriptedSource::new()
    });
    let cache = cache_with(CacheConfig::default(), Arc::clone(&source));

    let err = cache.get_or_refresh(&spec()).await.unwrap_err();
    assert!(err.is_retryable(), "{err}");
    assert!(cache.is_empty(), "failure must leave no entry behind");

    assert_ok!(cache.get_or_refresh(&spec()).await);
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn all_waiters_receive_the_leader_error() {
    let source = Arc::new(ScriptedSource {
        fail_first: 1,
        delay: Duration::from_millis(50),
        ..ScriptedSource::new()
    });
    let cache = cache_with(CacheConfig::default(), Arc::clone(&source));

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let cache = Arc::clone(&cache);
        tasks.push(tokio::spawn(
            async move { cache.get_or_refresh(&spec()).await },
        ));
    }

    for task in tasks {
        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(ConnError::CredentialSource { .. })
        ));
    }
    assert_eq!(source.calls(), 1);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn credentials_inside_the_margin_are_served_from_cache() {
    let source = Arc::new(ScriptedSource {
        ttl: Some(chrono::Duration::seconds(20)),
        ..ScriptedSource::new()
    });
    let config = CacheConfig {
        refresh_margin: Duration::from_secs(10),
        ..CacheConfig::default()
    };
    let cache = cache_with(config, Arc::clone(&source));

    let a = cache.get_or_refresh(&spec()).await.unwrap();
    let b = cache.get_or_refresh(&spec()).await.unwrap();
    assert!(a.same_instance(&b));
    assert_eq!(source.calls(), 1, "20s remaining > 10s margin: no refresh");
}

#[tokio::test]
async fn credentials_past_the_margin_are_refreshed() {
    let source = Arc::new(ScriptedSource {
        ttl: Some(chrono::Duration::seconds(20)),
        ..ScriptedSource::new()
    });
    let config = CacheConfig {
        refresh_margin: Duration::from_secs(30),
        ..CacheConfig::default()
    };
    let cache = cache_with(config, Arc::clone(&source));

    let a = cache.get_or_refresh(&spec()).await.unwrap();
    let b = cache.get_or_refresh(&spec()).await.unwrap();
    assert!(!a.same_instance(&b));
    assert_eq!(source.calls(), 2, "20s remaining < 30s margin: refresh");
}

#[tokio::test]
async fn waiter_times_out_without_cancelling_the_refresh() {
    let source = Arc::new(ScriptedSource {
        delay: Duration::from_secs(10),
        ..ScriptedSource::new()
    });
    let config = CacheConfig {
        wait_timeout: Duration::from_millis(100),
        ..CacheConfig::default()
    };
    let cache = cache_with(config, Arc::clone(&source));

    let leader = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get_or_refresh(&spec()).await })
    };
    // Give the leader time to install its refresh slot.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = cache.get_or_refresh(&spec()).await.unwrap_err();
    assert!(matches!(err, ConnError::Timeout(_)), "{err}");
    assert_eq!(source.calls(), 1, "the in-flight refresh keeps running");

    leader.abort();
}

#[tokio::test]
async fn invalidation_during_refresh_discards_the_result() {
    let source = Arc::new(ScriptedSource {
        delay: Duration::from_millis(100),
        ..ScriptedSource::new()
    });
    let cache = cache_with(CacheConfig::default(), Arc::clone(&source));

    let leader = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get_or_refresh(&spec()).await })
    };
    // Evict the fingerprint while the leader's obtain is still running.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(cache.invalidate_spec(&spec()));

    // The leader still gets its result, but must not write it back
    // into the slot it no longer owns.
    let stale = leader.await.unwrap().unwrap();
    assert!(
        !cache.contains(spec().fingerprint()),
        "discarded refresh result must not repopulate the cache"
    );

    let rebuilt = cache.get_or_refresh(&spec()).await.unwrap();
    assert_eq!(source.calls(), 2, "next caller performs a fresh obtain");
    assert!(!stale.same_instance(&rebuilt));
}

#[tokio::test]
async fn cancelled_waiter_detaches_without_affecting_the_refresh() {
    let source = Arc::new(ScriptedSource {
        delay: Duration::from_millis(100),
        ..ScriptedSource::new()
    });
    let cache = cache_with(CacheConfig::default(), Arc::clone(&source));

    let leader = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get_or_refresh(&spec()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let cancelled_waiter = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get_or_refresh(&spec()).await })
    };
    let surviving_waiter = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get_or_refresh(&spec()).await })
    };
    // Let both waiters subscribe, then drop one mid-wait.
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancelled_waiter.abort();
    assert!(cancelled_waiter.await.unwrap_err().is_cancelled());

    let led = leader.await.unwrap().unwrap();
    let survived = surviving_waiter.await.unwrap().unwrap();
    assert!(led.same_instance(&survived));
    assert_eq!(source.calls(), 1, "the refresh completed exactly once");
}

#[tokio::test]
async fn idle_entries_are_swept_when_ttl_is_set() {
    let source = Arc::new(ScriptedSource::new());
    let config = CacheConfig {
        idle_ttl: Some(Duration::from_millis(50)),
        ..CacheConfig::default()
    };
    let cache = cache_with(config, Arc::clone(&source));

    cache.get_or_refresh(&spec()).await.unwrap();
    assert_eq!(cache.len(), 1);

    tokio::time::sleep(Duration::from_millis(80)).await;
    cache.get_or_refresh(&spec()).await.unwrap();
    assert_eq!(source.calls(), 2, "idle entry was evicted and re-obtained");
}
