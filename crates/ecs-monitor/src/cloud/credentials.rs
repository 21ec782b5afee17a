//! Credential storage and background refresh
//!
//! [`CredentialStore`] hands out the current [`Credential`] to request code
//! and is swapped wholesale by [`run_refresh_loop`]. Readers clone an `Arc`
//! under a short read lock, so no caller ever sees a half-updated value and
//! the lock is never held across an API call.

use chrono::{DateTime, Utc};
use ecs_monitor_common::defaults::{
    CREDENTIAL_IDLE_INTERVAL, CREDENTIAL_REFRESH_WINDOW, CREDENTIAL_RETRY_INTERVAL,
};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors obtaining a credential
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("metadata request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("metadata path {path} returned HTTP {status}")]
    Status { path: String, status: u16 },

    #[error("invalid credential document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("metadata service returned code {code}")]
    Rejected { code: String },

    #[error("no RAM role is attached to this instance")]
    NoRole,

    #[error("invalid expiration timestamp {0:?}")]
    Expiration(String),

    #[error("static credentials are incomplete: {0} is not set")]
    Incomplete(&'static str),
}

/// An issued access credential. Never mutated after creation.
#[derive(Clone, PartialEq)]
pub struct Credential {
    pub access_key_id: String,
    pub access_key_secret: String,
    /// STS token for role credentials
    pub session_token: Option<String>,
    /// `None` for static keys, which never expire
    pub expires_at: Option<DateTime<Utc>>,
    pub region_id: String,
}

impl Credential {
    /// A long-lived key pair configured directly
    pub fn fixed(
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
        region_id: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
            session_token: None,
            expires_at: None,
            region_id: region_id.into(),
        }
    }

    /// Whether this credential needs the refresh loop
    pub fn is_temporary(&self) -> bool {
        self.expires_at.is_some()
    }
}

// The secret and token stay out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &self.access_key_id)
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("region_id", &self.region_id)
            .finish_non_exhaustive()
    }
}

/// Shared holder of the current credential
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<RwLock<Arc<Credential>>>,
}

impl CredentialStore {
    pub fn new(initial: Credential) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    /// Latest credential. Never blocks on I/O.
    pub fn current(&self) -> Arc<Credential> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Supersede the stored credential
    pub fn replace(&self, credential: Credential) {
        let next = Arc::new(credential);
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.current().expires_at
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CredentialStore").field(&self.current()).finish()
    }
}

/// Source of fresh credentials
#[allow(async_fn_in_trait)] // Spawned only with concrete providers
pub trait IdentityProvider: Send + Sync {
    async fn fetch(&self) -> Result<Credential, CredentialError>;
}

/// What the refresh loop does on its next tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStep {
    /// Enough lifetime left; sleep this long and check again
    Wait(Duration),
    /// Expiry is near; fetch a new credential now
    Refresh,
}

impl RefreshStep {
    /// Decide based on the remaining lifetime of the stored credential
    pub fn plan(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let Some(expires_at) = expires_at else {
            return RefreshStep::Wait(CREDENTIAL_IDLE_INTERVAL);
        };
        let remaining = (expires_at - now).to_std().unwrap_or(Duration::ZERO);
        if remaining < CREDENTIAL_REFRESH_WINDOW {
            RefreshStep::Refresh
        } else {
            RefreshStep::Wait(CREDENTIAL_IDLE_INTERVAL)
        }
    }

    /// Sleep before the next tick
    pub fn sleep(self) -> Duration {
        match self {
            RefreshStep::Wait(d) => d,
            RefreshStep::Refresh => CREDENTIAL_RETRY_INTERVAL,
        }
    }
}

/// Keep `store` fresh until `cancel` fires.
///
/// Checks once a second while the credential is inside the refresh window
/// and every nine minutes otherwise. A failed fetch keeps the stored
/// credential and is retried on the next tick.
pub async fn run_refresh_loop<P: IdentityProvider>(
    store: CredentialStore,
    provider: P,
    cancel: CancellationToken,
) {
    let mut delay = CREDENTIAL_RETRY_INTERVAL;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                debug!("Credential refresh loop stopped");
                return;
            }
        }

        let step = RefreshStep::plan(store.expires_at(), Utc::now());
        if step == RefreshStep::Refresh {
            match provider.fetch().await {
                Ok(credential) => {
                    info!(
                        access_key_id = %credential.access_key_id,
                        expires_at = ?credential.expires_at,
                        "Refreshed credential"
                    );
                    store.replace(credential);
                }
                Err(e) => warn!(error = %e, "Credential refresh failed, keeping current credential"),
            }
        }
        delay = step.sleep();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn temporary(key: &str, lifetime: chrono::Duration) -> Credential {
        Credential {
            access_key_id: key.to_string(),
            access_key_secret: format!("{key}-secret"),
            session_token: Some(format!("{key}-token")),
            expires_at: Some(Utc::now() + lifetime),
            region_id: "cn-hangzhou".to_string(),
        }
    }

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl IdentityProvider for CountingProvider {
        async fn fetch(&self) -> Result<Credential, CredentialError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CredentialError::NoRole);
            }
            Ok(temporary(&format!("key-{n}"), chrono::Duration::hours(1)))
        }
    }

    #[test]
    fn test_plan_far_from_expiry() {
        let now = Utc::now();
        let step = RefreshStep::plan(Some(now + chrono::Duration::minutes(15)), now);
        assert_eq!(step, RefreshStep::Wait(Duration::from_secs(9 * 60)));
        assert_eq!(step.sleep(), Duration::from_secs(540));
    }

    #[test]
    fn test_plan_near_expiry() {
        let now = Utc::now();
        let step = RefreshStep::plan(Some(now + chrono::Duration::minutes(5)), now);
        assert_eq!(step, RefreshStep::Refresh);
        assert_eq!(step.sleep(), Duration::from_secs(1));
    }

    #[test]
    fn test_plan_already_expired() {
        let now = Utc::now();
        let step = RefreshStep::plan(Some(now - chrono::Duration::minutes(1)), now);
        assert_eq!(step, RefreshStep::Refresh);
    }

    #[test]
    fn test_plan_static_credential() {
        assert!(matches!(RefreshStep::plan(None, Utc::now()), RefreshStep::Wait(_)));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let cred = temporary("AK", chrono::Duration::hours(1));
        let out = format!("{cred:?}");
        assert!(out.contains("AK"));
        assert!(!out.contains("AK-secret"));
        assert!(!out.contains("AK-token"));
    }

    #[test]
    fn test_replace_is_wholesale() {
        let store = CredentialStore::new(temporary("old", chrono::Duration::hours(1)));
        let before = store.current();
        store.replace(temporary("new", chrono::Duration::hours(2)));
        let after = store.current();

        // Earlier readers keep their complete snapshot
        assert_eq!(before.access_key_id, "old");
        assert_eq!(before.access_key_secret, "old-secret");
        assert_eq!(after.access_key_id, "new");
        assert_eq!(after.access_key_secret, "new-secret");
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_values() {
        let store = CredentialStore::new(temporary("k0", chrono::Duration::hours(1)));
        std::thread::scope(|s| {
            let writer = store.clone();
            s.spawn(move || {
                for i in 1..500 {
                    writer.replace(temporary(&format!("k{i}"), chrono::Duration::hours(1)));
                }
            });
            for _ in 0..4 {
                let reader = store.clone();
                s.spawn(move || {
                    for _ in 0..500 {
                        let c = reader.current();
                        assert_eq!(c.access_key_secret, format!("{}-secret", c.access_key_id));
                        assert_eq!(
                            c.session_token.as_deref(),
                            Some(format!("{}-token", c.access_key_id).as_str())
                        );
                    }
                });
            }
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_refreshes_near_expiry() {
        let store = CredentialStore::new(temporary("old", chrono::Duration::minutes(5)));
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_refresh_loop(
            store.clone(),
            CountingProvider { calls: calls.clone(), fail: false },
            cancel.clone(),
        ));

        // First tick after 1s refreshes; the new credential has an hour left
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.current().access_key_id, "key-0");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_keeps_credential_on_failure() {
        let store = CredentialStore::new(temporary("old", chrono::Duration::minutes(5)));
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_refresh_loop(
            store.clone(),
            CountingProvider { calls: calls.clone(), fail: true },
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        // Retried once per second, credential untouched
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.current().access_key_id, "old");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_idles_when_fresh() {
        let store = CredentialStore::new(temporary("old", chrono::Duration::hours(1)));
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_refresh_loop(
            store.clone(),
            CountingProvider { calls: calls.clone(), fail: false },
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(20 * 60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        cancel.cancel();
        handle.await.unwrap();
    }
}
