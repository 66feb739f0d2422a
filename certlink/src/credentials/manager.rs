//! Credential lifecycle management.
//!
//! Holds the current credential for one identity provider, renews it ahead
//! of expiry and guarantees at most one renewal is in flight at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::provider::IdentityProvider;
use super::types::{Credential, CredentialState, RefreshOutcome};
use crate::error::{Error, Result};

pub struct CredentialLifecycleManager {
    provider: Arc<dyn IdentityProvider>,
    credential: RwLock<Option<Arc<Credential>>>,
    /// Serializes renewals; a held lock means a renewal is in flight.
    refresh_lock: Mutex<()>,
    /// Bumped after every installed credential.
    generation: AtomicU64,
    refresh_buffer: chrono::Duration,
}

impl CredentialLifecycleManager {
    pub fn new(provider: Arc<dyn IdentityProvider>, refresh_buffer: Duration) -> Self {
        Self {
            provider,
            credential: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            refresh_buffer: chrono::Duration::from_std(refresh_buffer)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Snapshot of the installed credential, if any.
    pub fn current(&self) -> Option<Arc<Credential>> {
        self.credential.read().clone()
    }

    pub fn state(&self) -> CredentialState {
        if self.refresh_lock.try_lock().is_err() {
            return CredentialState::Refreshing;
        }
        match self.current() {
            None => CredentialState::Empty,
            Some(c) if c.is_near_expiry(self.refresh_buffer, Utc::now()) => {
                CredentialState::NearExpiry
            }
            Some(_) => CredentialState::Valid,
        }
    }

    /// Return a usable access token, renewing it first when needed.
    ///
    /// With `force_refresh` the current credential is discarded and a full
    /// login is performed. Callers that queue behind an in-flight renewal
    /// receive that renewal's result instead of starting another.
    pub async fn get_token(&self, force_refresh: bool) -> Result<String> {
        let observed = self.generation.load(Ordering::Acquire);

        if !force_refresh && let Some(token) = self.fresh_token() {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Someone else renewed while we waited for the lock.
        if self.generation.load(Ordering::Acquire) != observed
            && let Some(credential) = self.current()
        {
            debug!(
                provider = self.provider.provider_id(),
                "Using credential renewed by a concurrent caller"
            );
            return Ok(credential.access_token.clone());
        }

        if !force_refresh && let Some(token) = self.fresh_token() {
            return Ok(token);
        }

        let credential = self.renew(force_refresh).await?;
        Ok(credential.access_token.clone())
    }

    /// Replace a token the upstream rejected with a freshly issued one.
    ///
    /// Performs a full login unless the installed token already differs
    /// from `rejected`, in which case another caller renewed it first.
    pub async fn renew_rejected(&self, rejected: &str) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(credential) = self.current()
            && !credential.access_token.is_empty()
            && credential.access_token != rejected
        {
            debug!(
                provider = self.provider.provider_id(),
                "Rejected token already replaced"
            );
            return Ok(credential.access_token.clone());
        }

        let credential = self.renew(true).await?;
        Ok(credential.access_token.clone())
    }

    fn fresh_token(&self) -> Option<String> {
        self.current()
            .filter(|c| !c.access_token.is_empty())
            .filter(|c| !c.is_near_expiry(self.refresh_buffer, Utc::now()))
            .map(|c| c.access_token.clone())
    }

    /// Must be called with `refresh_lock` held.
    async fn renew(&self, force_login: bool) -> Result<Arc<Credential>> {
        let provider = self.provider.provider_id();
        let refresh_token = if force_login {
            None
        } else {
            self.current().and_then(|c| c.refresh_token.clone())
        };

        let outcome = match refresh_token {
            Some(token) => {
                info!(provider, "Refreshing credential");
                match self.provider.refresh(&token).await {
                    Ok(outcome) => outcome,
                    Err(e) if is_rejected_grant(&e) => {
                        warn!(
                            provider,
                            error = %e,
                            "Refresh token rejected, falling back to login"
                        );
                        self.login().await?
                    }
                    Err(e) => return Err(e),
                }
            }
            None => {
                info!(provider, forced = force_login, "Logging in for a new credential");
                self.login().await?
            }
        };

        self.install(outcome)
    }

    async fn login(&self) -> Result<RefreshOutcome> {
        self.provider.login().await.map_err(|e| {
            if is_rejected_grant(&e) {
                Error::CredentialUnavailable(format!("login rejected: {e}"))
            } else {
                e
            }
        })
    }

    fn install(&self, outcome: RefreshOutcome) -> Result<Arc<Credential>> {
        if outcome.access_token.is_empty() {
            return Err(Error::CredentialUnavailable(format!(
                "{} returned no access token",
                self.provider.provider_id()
            )));
        }

        let now = Utc::now();
        let credential = Arc::new(Credential::from_outcome(outcome, now));
        *self.credential.write() = Some(Arc::clone(&credential));
        self.generation.fetch_add(1, Ordering::Release);

        info!(
            provider = self.provider.provider_id(),
            expires_in_secs = credential.remaining(now).num_seconds(),
            "Credential renewed"
        );
        Ok(credential)
    }
}

/// The identity endpoint refused the grant itself (as opposed to being
/// unreachable or failing server-side).
fn is_rejected_grant(err: &Error) -> bool {
    matches!(err.upstream_status(), Some(400 | 401))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct FakeProvider {
        logins: AtomicU32,
        refreshes: AtomicU32,
        lifetime_secs: i64,
        refresh_status: Option<u16>,
        login_status: Option<u16>,
        empty_token: bool,
    }

    impl FakeProvider {
        fn issue(&self, prefix: &str, n: u32) -> RefreshOutcome {
            RefreshOutcome {
                access_token: if self.empty_token {
                    String::new()
                } else {
                    format!("{prefix}-{n}")
                },
                refresh_token: Some(format!("refresh-{n}")),
                token_type: Some("bearer".into()),
                expires_in: Some(self.lifetime_secs),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn provider_id(&self) -> &'static str {
            "fake"
        }

        async fn login(&self) -> Result<RefreshOutcome> {
            let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
            if let Some(status) = self.login_status {
                return Err(Error::from_status("fake", status, "bad credentials"));
            }
            Ok(self.issue("login", n))
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<RefreshOutcome> {
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
            if let Some(status) = self.refresh_status {
                return Err(Error::from_status("fake", status, "invalid_grant"));
            }
            Ok(self.issue("refresh", n))
        }
    }

    fn manager(provider: Arc<FakeProvider>) -> CredentialLifecycleManager {
        CredentialLifecycleManager::new(provider, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_first_call_logs_in_then_reuses() {
        let provider = Arc::new(FakeProvider {
            lifetime_secs: 3600,
            ..Default::default()
        });
        let manager = manager(provider.clone());
        assert_eq!(manager.state(), CredentialState::Empty);

        assert_eq!(manager.get_token(false).await.unwrap(), "login-1");
        assert_eq!(manager.get_token(false).await.unwrap(), "login-1");

        assert_eq!(provider.logins.load(Ordering::SeqCst), 1);
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(manager.state(), CredentialState::Valid);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        // Every issued credential is already inside the refresh buffer.
        let provider = Arc::new(FakeProvider {
            lifetime_secs: 60,
            ..Default::default()
        });
        let manager = Arc::new(manager(provider.clone()));
        manager.get_token(false).await.unwrap();
        assert_eq!(manager.state(), CredentialState::NearExpiry);

        let tokens = futures::future::join_all((0..10).map(|_| {
            let manager = Arc::clone(&manager);
            async move { manager.get_token(false).await.unwrap() }
        }))
        .await;

        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(provider.logins.load(Ordering::SeqCst), 1);
        assert!(tokens.iter().all(|t| t == "refresh-1"));
    }

    #[tokio::test]
    async fn test_rejected_refresh_falls_back_to_single_login() {
        let provider = Arc::new(FakeProvider {
            lifetime_secs: 60,
            refresh_status: Some(401),
            ..Default::default()
        });
        let manager = manager(provider.clone());
        manager.get_token(false).await.unwrap();

        let token = manager.get_token(false).await.unwrap();

        assert_eq!(token, "login-2");
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(provider.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refresh_server_error_propagates() {
        let provider = Arc::new(FakeProvider {
            lifetime_secs: 60,
            refresh_status: Some(503),
            ..Default::default()
        });
        let manager = manager(provider.clone());
        manager.get_token(false).await.unwrap();

        let err = manager.get_token(false).await.unwrap_err();

        assert_eq!(err.upstream_status(), Some(503));
        assert_eq!(provider.logins.load(Ordering::SeqCst), 1);
        // The previous credential is kept.
        assert_eq!(manager.current().unwrap().access_token, "login-1");
    }

    #[tokio::test]
    async fn test_forced_refresh_logs_in_once_for_concurrent_callers() {
        let provider = Arc::new(FakeProvider {
            lifetime_secs: 3600,
            ..Default::default()
        });
        let manager = Arc::new(manager(provider.clone()));
        manager.get_token(false).await.unwrap();

        let tokens = futures::future::join_all((0..5).map(|_| {
            let manager = Arc::clone(&manager);
            async move { manager.get_token(true).await.unwrap() }
        }))
        .await;

        assert_eq!(provider.logins.load(Ordering::SeqCst), 2);
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 0);
        assert!(tokens.iter().all(|t| t == "login-2"));
    }

    #[tokio::test]
    async fn test_rejected_token_replaced_once() {
        let provider = Arc::new(FakeProvider {
            lifetime_secs: 3600,
            ..Default::default()
        });
        let manager = manager(provider.clone());
        let stale = manager.get_token(false).await.unwrap();

        // The second rejection of the same token arrives after the first
        // replacement finished.
        let first = manager.renew_rejected(&stale).await.unwrap();
        let second = manager.renew_rejected(&stale).await.unwrap();

        assert_eq!(first, "login-2");
        assert_eq!(second, "login-2");
        assert_eq!(provider.logins.load(Ordering::SeqCst), 2);

        // Rejecting the current token renews again.
        assert_eq!(manager.renew_rejected(&second).await.unwrap(), "login-3");
    }

    #[tokio::test]
    async fn test_empty_token_is_unavailable() {
        let provider = Arc::new(FakeProvider {
            lifetime_secs: 3600,
            empty_token: true,
            ..Default::default()
        });
        let manager = manager(provider);

        assert!(matches!(
            manager.get_token(false).await,
            Err(Error::CredentialUnavailable(_))
        ));
        assert_eq!(manager.state(), CredentialState::Empty);
    }

    #[tokio::test]
    async fn test_rejected_login_is_unavailable() {
        let provider = Arc::new(FakeProvider {
            lifetime_secs: 3600,
            login_status: Some(400),
            ..Default::default()
        });
        let manager = manager(provider);

        assert!(matches!(
            manager.get_token(false).await,
            Err(Error::CredentialUnavailable(_))
        ));
    }
}
