//! Test doubles: a local token endpoint and scripted browsers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use common::Secret;
use reqwest::Url;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};

use crate::browser::Browser;
use crate::client::ClientConfig;

pub(crate) const TEST_CLIENT_ID: &str = "test-client";
pub(crate) const TEST_CLIENT_SECRET: &str = "test-secret";

/// Code the mock endpoint accepts.
pub(crate) const GOOD_CODE: &str = "4/good-code";
/// Refresh token the mock endpoint accepts (issued for `GOOD_CODE`).
pub(crate) const GOOD_REFRESH: &str = "R1";
/// Refresh token answered with a rotated refresh token.
pub(crate) const ROTATING_REFRESH: &str = "R-rotate";
/// Refresh token answered with 503.
pub(crate) const UNAVAILABLE_REFRESH: &str = "R-unavailable";

pub(crate) fn test_config(token_url: &str, redirect_uri: &str) -> ClientConfig {
    ClientConfig::new(
        TEST_CLIENT_ID,
        Secret::new(TEST_CLIENT_SECRET.to_string()),
        redirect_uri,
    )
    .unwrap()
    .with_scopes(["scope-a", "scope-b"])
    .with_token_endpoint(token_url)
    .unwrap()
}

#[derive(Clone, Default)]
struct EndpointState {
    exchanges: Arc<AtomicUsize>,
    refreshes: Arc<AtomicUsize>,
    last_form: Arc<Mutex<HashMap<String, String>>>,
}

/// A token endpoint served by axum on an ephemeral port.
pub(crate) struct MockTokenEndpoint {
    pub(crate) url: String,
    state: EndpointState,
    handle: tokio::task::JoinHandle<()>,
}

impl MockTokenEndpoint {
    pub(crate) fn exchanges(&self) -> usize {
        self.state.exchanges.load(Ordering::SeqCst)
    }

    pub(crate) fn refreshes(&self) -> usize {
        self.state.refreshes.load(Ordering::SeqCst)
    }

    pub(crate) async fn last_form(&self) -> HashMap<String, String> {
        self.state.last_form.lock().await.clone()
    }
}

impl Drop for MockTokenEndpoint {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub(crate) async fn start_token_endpoint() -> MockTokenEndpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = EndpointState::default();

    let app = Router::new()
        .route("/token", post(token_handler))
        .with_state(state.clone());
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockTokenEndpoint {
        url: format!("http://{addr}/token"),
        state,
        handle,
    }
}

fn oauth_error(status: StatusCode, error: &str, description: &str) -> Response {
    (
        status,
        axum::Json(serde_json::json!({
            "error": error,
            "error_description": description,
        })),
    )
        .into_response()
}

fn field<'a>(form: &'a HashMap<String, String>, name: &str) -> &'a str {
    form.get(name).map(String::as_str).unwrap_or_default()
}

async fn token_handler(
    State(state): State<EndpointState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    *state.last_form.lock().await = form.clone();

    if field(&form, "client_id") != TEST_CLIENT_ID
        || field(&form, "client_secret") != TEST_CLIENT_SECRET
    {
        return oauth_error(StatusCode::UNAUTHORIZED, "invalid_client", "Unauthorized");
    }

    match field(&form, "grant_type") {
        "authorization_code" => {
            state.exchanges.fetch_add(1, Ordering::SeqCst);
            if field(&form, "code") != GOOD_CODE || field(&form, "redirect_uri").is_empty() {
                return oauth_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_grant",
                    "Malformed auth code.",
                );
            }
            axum::Json(serde_json::json!({
                "access_token": "A1",
                "refresh_token": GOOD_REFRESH,
                "expires_in": 3600,
                "scope": "scope-a scope-b",
                "token_type": "Bearer",
            }))
            .into_response()
        }
        "refresh_token" => {
            let n = state.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            match field(&form, "refresh_token") {
                GOOD_REFRESH => axum::Json(serde_json::json!({
                    "access_token": format!("A-refresh-{n}"),
                    "expires_in": 3599,
                    "scope": "scope-a scope-b",
                    "token_type": "Bearer",
                }))
                .into_response(),
                ROTATING_REFRESH => axum::Json(serde_json::json!({
                    "access_token": format!("A-rotated-{n}"),
                    "refresh_token": "R2",
                    "expires_in": 3599,
                    "token_type": "Bearer",
                }))
                .into_response(),
                UNAVAILABLE_REFRESH => {
                    (StatusCode::SERVICE_UNAVAILABLE, "try later").into_response()
                }
                _ => oauth_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_grant",
                    "Token has been expired or revoked.",
                ),
            }
        }
        _ => oauth_error(StatusCode::BAD_REQUEST, "unsupported_grant_type", ""),
    }
}

const STRAY_WAIT: Duration = Duration::from_millis(300);

/// A browser that plays the user: it reads `redirect_uri` out of the
/// authorization URL and requests it with the scripted query string.
///
/// Each response the listener sends back is reported as `(status, body)`.
/// A stray request that gets no answer within `STRAY_WAIT` is reported as
/// `(0, "")`.
pub(crate) struct RedirectingBrowser {
    query: String,
    stray_paths: Vec<String>,
    opened: std::sync::Mutex<Vec<Url>>,
    responses: mpsc::UnboundedSender<(u16, String)>,
}

impl RedirectingBrowser {
    pub(crate) fn new(query: &str) -> (Self, mpsc::UnboundedReceiver<(u16, String)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let browser = Self {
            query: query.to_string(),
            stray_paths: Vec::new(),
            opened: std::sync::Mutex::new(Vec::new()),
            responses: tx,
        };
        (browser, rx)
    }

    /// Request these paths on the listener before the real redirect, giving
    /// each `STRAY_WAIT` to be answered.
    pub(crate) fn with_stray_paths(mut self, paths: &[&str]) -> Self {
        self.stray_paths = paths.iter().map(|p| p.to_string()).collect();
        self
    }

    pub(crate) fn opened(&self) -> Vec<Url> {
        self.opened.lock().unwrap().clone()
    }
}

impl Browser for RedirectingBrowser {
    fn open(&self, url: &Url) -> std::io::Result<()> {
        self.opened.lock().unwrap().push(url.clone());

        let redirect = url
            .query_pairs()
            .find(|(key, _)| key == "redirect_uri")
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| std::io::Error::other("authorization URL has no redirect_uri"))?;
        let redirect = Url::parse(&redirect).map_err(std::io::Error::other)?;

        let stray: Vec<Url> = self
            .stray_paths
            .iter()
            .map(|path| redirect.join(path).unwrap())
            .collect();
        let mut callback = redirect.clone();
        callback.set_query(Some(&self.query));
        let responses = self.responses.clone();

        tokio::spawn(async move {
            let client = reqwest::Client::new();
            for target in stray {
                let reply = match client.get(target).timeout(STRAY_WAIT).send().await {
                    Ok(response) => (
                        response.status().as_u16(),
                        response.text().await.unwrap_or_default(),
                    ),
                    Err(_) => (0, String::new()),
                };
                let _ = responses.send(reply);
            }
            if let Ok(response) = client.get(callback).send().await {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                let _ = responses.send((status, body));
            }
        });
        Ok(())
    }
}

/// A browser that cannot be launched.
pub(crate) struct BrokenBrowser;

impl Browser for BrokenBrowser {
    fn open(&self, _url: &Url) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no browser available",
        ))
    }
}
