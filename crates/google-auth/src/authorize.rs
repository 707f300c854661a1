//! Interactive authorization-code grant
//!
//! One run of the flow:
//! 1. Bind the callback listener on the registered redirect URI
//! 2. Send the user's browser to the authorization URL
//! 3. Wait for the single redirect carrying the code
//! 4. Exchange the code at the token endpoint
//!
//! The result is an in-memory `Credential`; persisting it is the token
//! manager's job.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tracing::{info, warn};

use crate::browser::{Browser, SystemBrowser};
use crate::callback::CallbackListener;
use crate::client::ClientConfig;
use crate::clock::{Clock, SystemClock};
use crate::credentials::Credential;
use crate::error::Result;
use crate::token;

/// Default bound on the wait for the browser redirect.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Build the authorization URL for a redirect URI.
///
/// Always requests offline access so the provider issues a refresh token.
/// Scopes are joined with single spaces in configured order.
pub fn build_authorization_url(config: &ClientConfig, redirect_uri: &Url) -> Url {
    let mut url = config.authorize_endpoint.clone();
    url.query_pairs_mut()
        .append_pair("access_type", "offline")
        .append_pair("scope", &config.scope_param())
        .append_pair("response_type", "code")
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", redirect_uri.as_str());
    url
}

/// Runs the browser-based authorization-code grant.
pub struct AuthorizationFlow {
    config: Arc<ClientConfig>,
    http: reqwest::Client,
    browser: Arc<dyn Browser>,
    clock: Arc<dyn Clock>,
    callback_timeout: Option<Duration>,
}

impl AuthorizationFlow {
    pub fn new(config: Arc<ClientConfig>, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            browser: Arc::new(SystemBrowser),
            clock: Arc::new(SystemClock),
            callback_timeout: Some(DEFAULT_CALLBACK_TIMEOUT),
        }
    }

    pub fn with_browser(mut self, browser: Arc<dyn Browser>) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// `None` waits for the redirect forever.
    pub fn with_callback_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// The authorization URL for the configured redirect URI.
    pub fn authorization_url(&self) -> Url {
        build_authorization_url(&self.config, &self.config.redirect_uri)
    }

    /// Complete one authorization-code grant.
    ///
    /// Any failure is terminal for this run; a retry starts over from a new
    /// authorization URL.
    pub async fn run(&self) -> Result<Credential> {
        let listener = CallbackListener::bind(&self.config.redirect_uri).await?;
        let redirect_uri = listener.redirect_uri().clone();
        let url = build_authorization_url(&self.config, &redirect_uri);

        info!("opening browser for authorization");
        if let Err(e) = self.browser.open(&url) {
            warn!(error = %e, url = %url, "could not open a browser, visit the URL manually");
        }

        let code = listener.wait_for_code(self.callback_timeout).await?;

        info!("exchanging authorization code for tokens");
        let response =
            token::exchange_code(&self.http, &self.config, &redirect_uri, &code).await?;
        if response.refresh_token.is_none() {
            warn!("provider did not issue a refresh token");
        }

        Ok(response.into_credential(self.clock.now_millis()))
    }
}
