//! Google Photos authentication CLI
//!
//! Single-binary tool that:
//! 1. Loads the registered OAuth client and the stored credential
//! 2. Runs the browser authorization flow when nothing usable is stored
//! 3. Refreshes or reuses the stored token otherwise
//! 4. Prints the access token on stdout
//!
//! Logs go to stderr so the token can be captured with `$(google-photos-auth)`.

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use google_auth::{AuthorizationFlow, CredentialStore, RefreshFlow, TokenManager};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Upper bound on any single token endpoint request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with LOG_LEVEL / RUST_LOG support; stdout is reserved
    // for the token
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = Config::resolve_path(config_arg(&args));
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    info!(
        store = %config.store.path.display(),
        refresh_policy = ?config.flow.refresh_policy,
        "configuration loaded"
    );

    let manager = build_manager(&config)?;
    let token = manager
        .access_token()
        .await
        .context("failed to obtain an access token")?;

    println!("{token}");
    Ok(())
}

/// CLI: simple `--config <path>` flag parsing
fn config_arg(args: &[String]) -> Option<&str> {
    args.iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

/// Wire the client, HTTP client, flows and store into a token manager.
fn build_manager(config: &Config) -> Result<TokenManager> {
    let client = Arc::new(
        config
            .client_config()
            .context("failed to load OAuth client configuration")?,
    );
    info!(
        client_id = %client.client_id,
        redirect_uri = %client.redirect_uri,
        scopes = client.scopes.len(),
        "OAuth client ready"
    );

    let http = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    let authorizer = AuthorizationFlow::new(client.clone(), http.clone())
        .with_callback_timeout(config.callback_timeout());
    let refresher = RefreshFlow::new(client, http);

    Ok(TokenManager::new(
        CredentialStore::new(&config.store.path),
        authorizer,
        refresher,
    )
    .with_policy(config.flow.refresh_policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Secret;
    use google_auth::Credential;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_config_arg_parsing() {
        assert_eq!(
            config_arg(&args(&["google-photos-auth", "--config", "/etc/p.toml"])),
            Some("/etc/p.toml")
        );
        assert_eq!(config_arg(&args(&["google-photos-auth"])), None);
        assert_eq!(config_arg(&args(&["google-photos-auth", "--config"])), None);
    }

    fn config_with_env_client(store: std::path::PathBuf) -> Config {
        let mut config = Config::default();
        config.client.client_id = Some("cli-client".into());
        config.client.client_secret = Some(Secret::new("cli-secret".to_string()));
        config.store.path = store;
        config
    }

    #[tokio::test]
    async fn test_build_manager_uses_configured_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("auth.json");
        let manager = build_manager(&config_with_env_client(store.clone())).unwrap();
        assert_eq!(manager.store().path(), store.as_path());
    }

    #[tokio::test]
    async fn test_expired_stored_token_is_printed_without_network() {
        // Default policy hands back an expired token as stored, so this never
        // touches the token endpoint or the browser
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("auth.json");
        CredentialStore::new(&store)
            .save(&Credential {
                access_token: "A-stale".into(),
                refresh_token: Some("R1".into()),
                expiry_date: Some(1),
                scope: None,
                token_type: Some("Bearer".into()),
            })
            .await
            .unwrap();

        let manager = build_manager(&config_with_env_client(store)).unwrap();
        assert_eq!(manager.access_token().await.unwrap(), "A-stale");
    }

    #[test]
    fn test_build_manager_without_client_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.client.credentials_file = dir.path().join("absent.json");

        let err = build_manager(&config).err().unwrap();
        assert!(
            format!("{err:#}").contains("not found"),
            "got: {err:#}"
        );
    }
}
