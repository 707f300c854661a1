//! Google OAuth2 token lifecycle for local CLI tools
//!
//! Obtains an access token for the Google Photos Library API, persists it
//! next to the tool, and keeps it usable across runs. The crate has no
//! dependency on the binary, so it can be tested and embedded on its own.
//!
//! Credential flow:
//! 1. `TokenManager::access_token()` loads `auth.json` via `CredentialStore`
//! 2. No usable credential: `AuthorizationFlow::run()` binds the
//!    `CallbackListener`, opens the browser, and exchanges the returned code
//!    with `token::exchange_code()`
//! 3. Stored credential due for refresh: `RefreshFlow::refresh()` calls
//!    `token::refresh_token()`
//! 4. New token material saved atomically via `CredentialStore::save()`

pub mod authorize;
pub mod browser;
pub mod callback;
pub mod client;
pub mod clock;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod manager;
pub mod refresh;
pub mod token;

#[cfg(test)]
mod test_support;

pub use authorize::{AuthorizationFlow, DEFAULT_CALLBACK_TIMEOUT, build_authorization_url};
pub use browser::{Browser, SystemBrowser};
pub use callback::CallbackListener;
pub use client::ClientConfig;
pub use clock::{Clock, FixedClock, SystemClock};
pub use constants::*;
pub use credentials::{Credential, CredentialStore, Expiry};
pub use error::{Error, Result};
pub use manager::{Authorize, Decision, Refresh, RefreshPolicy, TokenManager, decide};
pub use refresh::{RefreshFlow, RefreshedToken};
pub use token::{TokenResponse, exchange_code, refresh_token};
