//! Refresh-token grant

use std::sync::Arc;

use tracing::info;

use crate::client::ClientConfig;
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::token;

/// New token material from a refresh. `refresh_token` is only set when the
/// provider rotated it; otherwise the caller keeps the old one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry_date: Option<u64>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

/// Mints access tokens from a refresh token, without user interaction.
///
/// Holds no per-call state, so concurrent or repeated calls are independent.
pub struct RefreshFlow {
    config: Arc<ClientConfig>,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl RefreshFlow {
    pub fn new(config: Arc<ClientConfig>, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// `RefreshRejected` means only a new interactive authorization can
    /// recover; `Http` is a transient failure.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken> {
        info!("re-authenticating with refresh token");
        let response = token::refresh_token(&self.http, &self.config, refresh_token).await?;
        let expiry_date = response.expiry_date(self.clock.now_millis());

        Ok(RefreshedToken {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expiry_date,
            scope: response.scope,
            token_type: response.token_type,
        })
    }
}
