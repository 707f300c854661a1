//! Token manager
//!
//! Decides on every call whether to run the interactive flow, refresh, or
//! hand back the stored access token, and is the only writer of the
//! credential store.
//!
//! The decision is a pure function of (stored credential, now, policy); the
//! manager executes the I/O it implies.
//!
//! Default policy (`WhileValid`):
//! - no usable stored credential   -> authorize
//! - expiry in the future/unknown  -> refresh, return the new token
//! - expiry in the past            -> return the stored token as-is
//!
//! `WhenExpired` swaps the last two rows.

use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::authorize::AuthorizationFlow;
use crate::clock::{Clock, SystemClock};
use crate::credentials::{Credential, CredentialStore, Expiry};
use crate::error::{Error, Result};
use crate::refresh::{RefreshFlow, RefreshedToken};

/// Produces a brand-new credential, usually by asking the user.
pub trait Authorize: Send + Sync {
    fn authorize(&self) -> impl Future<Output = Result<Credential>> + Send;
}

/// Trades a refresh token for new token material.
pub trait Refresh: Send + Sync {
    fn refresh(&self, refresh_token: &str) -> impl Future<Output = Result<RefreshedToken>> + Send;
}

impl Authorize for AuthorizationFlow {
    async fn authorize(&self) -> Result<Credential> {
        self.run().await
    }
}

impl Refresh for RefreshFlow {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken> {
        RefreshFlow::refresh(self, refresh_token).await
    }
}

/// When a stored credential gets refreshed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshPolicy {
    /// Refresh while the stored token is still valid (or its expiry is
    /// unknown); hand back the stored token once it has expired.
    #[default]
    WhileValid,
    /// Reuse the stored token while valid; refresh once expired or unknown.
    WhenExpired,
}

/// What the manager should do for this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Authorize,
    Refresh,
    Reuse,
}

/// Pick the branch for a stored credential at `now_millis`.
///
/// A refresh is only chosen when there is a refresh token to use; otherwise
/// the interactive flow is the only way forward.
pub fn decide(stored: Option<&Credential>, now_millis: u64, policy: RefreshPolicy) -> Decision {
    let Some(credential) = stored else {
        return Decision::Authorize;
    };

    let wants_refresh = match (policy, credential.expiry(now_millis)) {
        (RefreshPolicy::WhileValid, Expiry::Expired) => false,
        (RefreshPolicy::WhileValid, Expiry::Valid | Expiry::Unknown) => true,
        (RefreshPolicy::WhenExpired, Expiry::Valid) => false,
        (RefreshPolicy::WhenExpired, Expiry::Expired | Expiry::Unknown) => true,
    };

    match (wants_refresh, credential.refresh_token.is_some()) {
        (false, _) => Decision::Reuse,
        (true, true) => Decision::Refresh,
        (true, false) => Decision::Authorize,
    }
}

/// Hands out access tokens, persisting whatever new token material it obtains.
pub struct TokenManager<A = AuthorizationFlow, R = RefreshFlow> {
    store: CredentialStore,
    authorizer: A,
    refresher: R,
    clock: Arc<dyn Clock>,
    policy: RefreshPolicy,
}

impl<A: Authorize, R: Refresh> TokenManager<A, R> {
    pub fn new(store: CredentialStore, authorizer: A, refresher: R) -> Self {
        Self {
            store,
            authorizer,
            refresher,
            clock: Arc::new(SystemClock),
            policy: RefreshPolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Return an access token for the caller.
    ///
    /// Errors from the interactive flow and transient refresh errors are
    /// returned; a rejected refresh token falls back to the interactive flow.
    pub async fn access_token(&self) -> Result<String> {
        let stored = self.load_stored().await;
        let decision = decide(stored.as_ref(), self.clock.now_millis(), self.policy);

        match (decision, stored) {
            (Decision::Reuse, Some(credential)) => {
                info!("using current access token");
                Ok(credential.access_token)
            }
            (Decision::Refresh, Some(credential)) => self.refresh(credential).await,
            _ => self.authorize().await,
        }
    }

    async fn load_stored(&self) -> Option<Credential> {
        match self.store.load().await {
            Ok(credential) => Some(credential),
            Err(Error::NotFound(_)) => {
                info!(path = %self.store.path().display(), "no stored credential");
                None
            }
            Err(e) => {
                warn!(error = %e, "stored credential unusable, treating as absent");
                None
            }
        }
    }

    async fn authorize(&self) -> Result<String> {
        info!("authentication required");
        let credential = self.authorizer.authorize().await?;
        self.persist(&credential).await;
        Ok(credential.access_token)
    }

    async fn refresh(&self, stored: Credential) -> Result<String> {
        let Some(refresh_token) = stored.refresh_token.as_deref() else {
            return self.authorize().await;
        };

        match self.refresher.refresh(refresh_token).await {
            Ok(token) => {
                let updated = stored.refreshed(token);
                self.persist(&updated).await;
                Ok(updated.access_token)
            }
            Err(e) if e.requires_reauthorization() => {
                warn!(error = %e, "refresh token no longer accepted, re-authorizing");
                self.authorize().await
            }
            Err(e) => Err(e),
        }
    }

    /// Best effort: a failed save costs a re-authorization or refresh on the
    /// next run, never the token already in hand.
    async fn persist(&self, credential: &Credential) {
        match self.store.save(credential).await {
            Ok(()) => info!(path = %self.store.path().display(), "saved authentication tokens"),
            Err(e) => error!(error = %e, "unable to save authentication tokens locally"),
        }
    }
}
