//! Google OAuth endpoints and defaults
//!
//! These are public, well-known values. The client id and secret are not
//! here; they come from the registered client configuration at runtime.

/// Authorization endpoint the browser is sent to
pub const AUTHORIZE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Redirect URI registered for the local callback listener
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/oauth2callback";

/// Read-only access to the photo library
pub const SCOPE_PHOTOS_READONLY: &str = "https://www.googleapis.com/auth/photoslibrary.readonly";

/// Access to shared albums
pub const SCOPE_PHOTOS_SHARING: &str = "https://www.googleapis.com/auth/photoslibrary.sharing";

/// Scopes requested when none are configured, in request order.
pub const DEFAULT_SCOPES: &[&str] = &[SCOPE_PHOTOS_READONLY, SCOPE_PHOTOS_SHARING];

/// Default location of the persisted credential, relative to the working directory.
pub const DEFAULT_STORE_PATH: &str = "auth.json";

/// Plain-text body returned to the browser once the code has been captured.
pub const CALLBACK_SUCCESS_MESSAGE: &str =
    "Authentication successful! Return to the console/terminal.";

/// Plain-text body returned when the provider redirected with an error.
pub const CALLBACK_DENIED_MESSAGE: &str =
    "Authentication was not granted. Return to the console/terminal and try again.";
