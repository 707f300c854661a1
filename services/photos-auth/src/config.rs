//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client secret is loaded from GOOGLE_CLIENT_SECRET or the downloaded
//! client secrets file, never stored in the TOML directly.

use common::Secret;
use google_auth::{ClientConfig, DEFAULT_REDIRECT_URI, DEFAULT_STORE_PATH, RefreshPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file used when neither `--config` nor CONFIG_PATH is given.
pub const DEFAULT_CONFIG_FILE: &str = "photos-auth.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub flow: FlowSection,
}

/// Registered OAuth client
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    /// Client secrets JSON as downloaded from the Google Cloud console
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
    /// Overrides the redirect URI from the secrets file (or the default when
    /// the client comes from the environment)
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    #[serde(skip)]
    pub client_id: Option<String>,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
}

/// Credential persistence
#[derive(Debug, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

/// Token lifecycle behaviour
#[derive(Debug, Deserialize)]
pub struct FlowSection {
    #[serde(default)]
    pub refresh_policy: RefreshPolicy,
    /// Seconds to wait for the browser redirect; 0 waits forever
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_secs: u64,
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}

fn default_callback_timeout() -> u64 {
    google_auth::DEFAULT_CALLBACK_TIMEOUT.as_secs()
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            credentials_file: default_credentials_file(),
            redirect_uri: None,
            scopes: None,
            client_id: None,
            client_secret: None,
        }
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for FlowSection {
    fn default() -> Self {
        Self {
            refresh_policy: RefreshPolicy::default(),
            callback_timeout_secs: default_callback_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.finish()
    }

    /// Like `load`, but a missing `photos-auth.toml` in the working directory
    /// yields the built-in defaults. An explicitly named file must exist.
    pub fn load_or_default(path: &Path) -> common::Result<Self> {
        if path == Path::new(DEFAULT_CONFIG_FILE) && !path.exists() {
            return Config::default().finish();
        }
        Self::load(path)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    fn finish(mut self) -> common::Result<Self> {
        self.validate()?;

        // Client identity from the environment takes precedence over the file
        match (
            std::env::var("GOOGLE_CLIENT_ID"),
            std::env::var("GOOGLE_CLIENT_SECRET"),
        ) {
            (Ok(id), Ok(secret)) => {
                self.client.client_id = Some(id);
                self.client.client_secret = Some(Secret::new(secret));
            }
            (Err(_), Err(_)) => {}
            _ => {
                return Err(common::Error::Config(
                    "GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET must be set together".into(),
                ));
            }
        }

        Ok(self)
    }

    fn validate(&self) -> common::Result<()> {
        if let Some(ref uri) = self.client.redirect_uri
            && !uri.starts_with("http://")
            && !uri.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "redirect_uri must start with http:// or https://, got: {uri}"
            )));
        }

        if let Some(ref scopes) = self.client.scopes
            && (scopes.is_empty() || scopes.iter().any(|s| s.trim().is_empty()))
        {
            return Err(common::Error::Config(
                "scopes must be a non-empty list of non-empty strings".into(),
            ));
        }

        if self.store.path.as_os_str().is_empty() {
            return Err(common::Error::Config("store.path must not be empty".into()));
        }

        Ok(())
    }

    /// Build the OAuth client from environment credentials or the client
    /// secrets file, applying the configured redirect URI and scopes.
    pub fn client_config(&self) -> google_auth::Result<ClientConfig> {
        let client = match (&self.client.client_id, &self.client.client_secret) {
            (Some(id), Some(secret)) => ClientConfig::new(
                id.as_str(),
                secret.clone(),
                self.client
                    .redirect_uri
                    .as_deref()
                    .unwrap_or(DEFAULT_REDIRECT_URI),
            )?,
            _ => {
                let from_file = ClientConfig::from_client_secrets_file(&self.client.credentials_file)?;
                match self.client.redirect_uri.as_deref() {
                    Some(uri) => ClientConfig::new(
                        from_file.client_id.as_str(),
                        from_file.client_secret.clone(),
                        uri,
                    )?
                    .with_authorize_endpoint(from_file.authorize_endpoint.as_str())?
                    .with_token_endpoint(from_file.token_endpoint.as_str())?,
                    None => from_file,
                }
            }
        };

        Ok(match self.client.scopes {
            Some(ref scopes) => client.with_scopes(scopes.iter().cloned()),
            None => client,
        })
    }

    /// `None` disables the callback timeout.
    pub fn callback_timeout(&self) -> Option<Duration> {
        match self.flow.callback_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
