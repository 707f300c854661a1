//! Token endpoint requests
//!
//! Two grant types POST to the same endpoint:
//! 1. `authorization_code` when the browser flow hands us a code
//! 2. `refresh_token` when a stored credential needs a new access token
//!
//! Both send the client id and secret in the form body.

use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::client::ClientConfig;
use crate::credentials::Credential;
use crate::error::{Error, Result};

/// Successful response from the token endpoint.
///
/// `expires_in` is a delta in seconds from the response time. Refresh
/// responses usually omit `refresh_token`.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// Absolute expiry in unix milliseconds, if the provider sent `expires_in`.
    pub fn expiry_date(&self, now_millis: u64) -> Option<u64> {
        self.expires_in
            .map(|secs| now_millis.saturating_add(secs.saturating_mul(1000)))
    }

    pub fn into_credential(self, now_millis: u64) -> Credential {
        Credential {
            expiry_date: self.expiry_date(now_millis),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            scope: self.scope,
            token_type: self.token_type,
        }
    }
}

/// OAuth error body, e.g. `{"error": "invalid_grant", "error_description": "Bad Request"}`.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn describe_error_body(body: &str) -> String {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(TokenErrorResponse {
            error,
            error_description: Some(description),
        }) => format!("{error}: {description}"),
        Ok(TokenErrorResponse { error, .. }) => error,
        Err(_) if body.trim().is_empty() => String::from("<no body>"),
        Err(_) => body.trim().to_string(),
    }
}

/// Exchange an authorization code for tokens.
///
/// `redirect_uri` must be the exact URI used in the authorization request.
pub async fn exchange_code(
    client: &reqwest::Client,
    config: &ClientConfig,
    redirect_uri: &Url,
    code: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(config.token_endpoint.clone())
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose().as_str()),
            ("redirect_uri", redirect_uri.as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::CodeExchange(format!(
            "token endpoint returned {status}: {}",
            describe_error_body(&body)
        )));
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::CodeExchange(format!("invalid token response: {e}")))?;
    if token.access_token.is_empty() {
        return Err(Error::CodeExchange(
            "token endpoint returned an empty access_token".into(),
        ));
    }
    Ok(token)
}

/// Trade a refresh token for a new access token.
///
/// 400/401/403 mean the refresh token (or client) is no longer accepted and
/// map to `RefreshRejected`. Anything else is reported as `Http`.
pub async fn refresh_token(
    client: &reqwest::Client,
    config: &ClientConfig,
    refresh: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(config.token_endpoint.clone())
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose().as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = describe_error_body(&body);

        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(Error::RefreshRejected(format!(
                "token endpoint returned {status}: {detail}"
            )));
        }

        return Err(Error::Http(format!(
            "token refresh returned {status}: {detail}"
        )));
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::Http(format!("invalid refresh response: {e}")))?;
    if token.access_token.is_empty() {
        return Err(Error::Http(
            "token endpoint returned an empty access_token".into(),
        ));
    }
    Ok(token)
}
