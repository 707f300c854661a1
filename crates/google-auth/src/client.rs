//! Registered OAuth client configuration
//!
//! Built once at startup and passed by reference into the flows. Endpoints
//! default to Google's but can be pointed anywhere, which is how tests run
//! against a local token endpoint.

use std::path::Path;

use common::Secret;
use reqwest::Url;
use serde::Deserialize;

use crate::constants::{AUTHORIZE_ENDPOINT, DEFAULT_REDIRECT_URI, DEFAULT_SCOPES, TOKEN_ENDPOINT};
use crate::error::{Error, Result};

/// The registered client: identity, redirect URI, scopes and endpoints.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// Must match the URI registered with the provider byte for byte.
    pub redirect_uri: Url,
    /// Requested in order, joined with single spaces.
    pub scopes: Vec<String>,
    pub authorize_endpoint: Url,
    pub token_endpoint: Url,
}

impl ClientConfig {
    /// Create a client with Google's endpoints and the default photo scopes.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: Secret<String>,
        redirect_uri: &str,
    ) -> Result<Self> {
        let client_id = client_id.into();
        if client_id.trim().is_empty() {
            return Err(Error::ConfigMissing("client_id is empty".into()));
        }
        if client_secret.is_empty() {
            return Err(Error::ConfigMissing("client_secret is empty".into()));
        }

        let redirect_uri = parse_http_url("redirect_uri", redirect_uri)?;
        if redirect_uri.port_or_known_default().is_none() {
            return Err(Error::InvalidConfig(format!(
                "redirect_uri has no port: {redirect_uri}"
            )));
        }

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            scopes: DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect(),
            authorize_endpoint: parse_http_url("authorize_endpoint", AUTHORIZE_ENDPOINT)?,
            token_endpoint: parse_http_url("token_endpoint", TOKEN_ENDPOINT)?,
        })
    }

    /// Replace the requested scopes. Order is preserved.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_authorize_endpoint(mut self, endpoint: &str) -> Result<Self> {
        self.authorize_endpoint = parse_http_url("authorize_endpoint", endpoint)?;
        Ok(self)
    }

    pub fn with_token_endpoint(mut self, endpoint: &str) -> Result<Self> {
        self.token_endpoint = parse_http_url("token_endpoint", endpoint)?;
        Ok(self)
    }

    /// Load a client secrets file as downloaded from the Google Cloud console.
    ///
    /// Accepts either the `web` or the `installed` application shape. The
    /// first entry of `redirect_uris` is used; `auth_uri` and `token_uri`
    /// override the default endpoints when present.
    pub fn from_client_secrets_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ConfigMissing(format!(
                    "client secrets file {} not found",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(Error::Io(format!(
                    "reading client secrets file {}: {e}",
                    path.display()
                )));
            }
        };
        Self::from_client_secrets_json(&contents)
    }

    /// Parse the JSON body of a client secrets file.
    pub fn from_client_secrets_json(json: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(format!("parsing client secrets: {e}")))?;
        let secrets = file.web.or(file.installed).ok_or_else(|| {
            Error::ConfigMissing("client secrets file has no `web` or `installed` entry".into())
        })?;

        let redirect_uri = secrets
            .redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_REDIRECT_URI);

        let mut config = Self::new(secrets.client_id, secrets.client_secret, redirect_uri)?;
        if let Some(auth_uri) = secrets.auth_uri.as_deref() {
            config = config.with_authorize_endpoint(auth_uri)?;
        }
        if let Some(token_uri) = secrets.token_uri.as_deref() {
            config = config.with_token_endpoint(token_uri)?;
        }
        Ok(config)
    }

    /// Space-separated scope string as sent to the provider.
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    web: Option<ClientSecrets>,
    installed: Option<ClientSecrets>,
}

#[derive(Deserialize)]
struct ClientSecrets {
    client_id: String,
    client_secret: Secret<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

fn parse_http_url(field: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value)
        .map_err(|e| Error::InvalidConfig(format!("{field} is not a valid URL ({value}): {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::InvalidConfig(format!(
            "{field} must start with http:// or https://, got: {value}"
        )));
    }
    if url.host_str().is_none() {
        return Err(Error::InvalidConfig(format!("{field} has no host: {value}")));
    }
    Ok(url)
}
