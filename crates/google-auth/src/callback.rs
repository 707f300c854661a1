//! One-shot redirect listener
//!
//! Binds the host/port of the registered redirect URI, serves exactly one
//! successful redirect, then shuts down. The code travels back through a
//! oneshot channel whose sender is taken by the first matching request, so
//! later requests can never start a second exchange.
//!
//! Requests to any other path get no answer at all; they stay open until
//! the listener goes away.
//!
//! The serving tasks are owned by a guard that aborts them on drop, which
//! covers success, errors, timeouts, and the caller dropping the future.

use std::net::{Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use reqwest::Url;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::constants::{CALLBACK_DENIED_MESSAGE, CALLBACK_SUCCESS_MESSAGE};
use crate::error::{Error, Result};

/// How long in-flight responses get to flush once the code has arrived.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type CallbackOutcome = Result<String>;

/// A bound, not yet serving, redirect listener.
pub struct CallbackListener {
    /// The first entry is the redirect URI's own address; `localhost` adds
    /// the IPv6 loopback when available.
    listeners: Vec<TcpListener>,
    redirect_uri: Url,
}

impl CallbackListener {
    /// Bind the redirect URI's host and port.
    ///
    /// `localhost` binds the IPv4 loopback, plus `::1` on the same port when
    /// the host has IPv6. Port `0` picks an ephemeral port and the effective
    /// redirect URI is updated to match.
    pub async fn bind(redirect_uri: &Url) -> Result<Self> {
        let host = redirect_uri.host_str().ok_or_else(|| {
            Error::InvalidConfig(format!("redirect_uri has no host: {redirect_uri}"))
        })?;
        let port = redirect_uri.port_or_known_default().ok_or_else(|| {
            Error::InvalidConfig(format!("redirect_uri has no port: {redirect_uri}"))
        })?;
        let bind_host = match host {
            "localhost" => "127.0.0.1",
            other => other.trim_start_matches('[').trim_end_matches(']'),
        };

        let listener = TcpListener::bind((bind_host, port))
            .await
            .map_err(|e| Error::ListenerBind(format!("{bind_host}:{port}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::ListenerBind(format!("{bind_host}:{port}: {e}")))?;

        let mut listeners = vec![listener];
        if host == "localhost" {
            match TcpListener::bind((Ipv6Addr::LOCALHOST, local_addr.port())).await {
                Ok(v6) => listeners.push(v6),
                Err(e) => debug!(error = %e, "IPv6 loopback unavailable, serving IPv4 only"),
            }
        }

        let mut redirect_uri = redirect_uri.clone();
        if port == 0 {
            redirect_uri
                .set_port(Some(local_addr.port()))
                .map_err(|_| Error::InvalidConfig(format!("cannot set port on {redirect_uri}")))?;
        }

        info!(addr = %local_addr, path = redirect_uri.path(), "callback listener bound");
        Ok(Self {
            listeners,
            redirect_uri,
        })
    }

    /// The redirect URI this listener answers, with the real port filled in.
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// Address of the primary listener.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listeners
            .first()
            .ok_or_else(|| Error::Io("callback listener has no socket".into()))?
            .local_addr()
            .map_err(|e| Error::Io(format!("callback listener address: {e}")))
    }

    /// Every bound address, primary first.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|l| l.local_addr().ok())
            .collect()
    }

    /// Serve until the first redirect carrying `code` (or `error`) arrives.
    ///
    /// `None` waits indefinitely. The listener is closed before this returns,
    /// whatever the outcome.
    pub async fn wait_for_code(self, timeout: Option<Duration>) -> Result<String> {
        let (code_tx, code_rx) = oneshot::channel::<CallbackOutcome>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let app = callback_router(self.redirect_uri.path(), code_tx);

        let handles = self
            .listeners
            .into_iter()
            .map(|listener| {
                let app = app.clone();
                let mut shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    axum::serve(listener, app)
                        .with_graceful_shutdown(async move {
                            let _ = shutdown_rx.wait_for(|stop| *stop).await;
                        })
                        .await
                })
            })
            .collect();
        let server = ServerGuard {
            handles,
            shutdown: shutdown_tx,
        };

        let received = match timeout {
            Some(limit) => tokio::time::timeout(limit, code_rx)
                .await
                .map_err(|_| Error::CallbackTimeout(limit)),
            None => Ok(code_rx.await),
        };
        server.shutdown().await;

        match received? {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Io(
                "callback listener stopped before a redirect arrived".into(),
            )),
        }
    }
}

/// Owns the serving tasks. Dropping it aborts them and closes the sockets.
struct ServerGuard {
    handles: Vec<JoinHandle<std::io::Result<()>>>,
    shutdown: watch::Sender<bool>,
}

impl ServerGuard {
    /// Stop accepting, then give in-flight responses `SHUTDOWN_GRACE` to
    /// flush. Requests left pending on other paths hold a server until the
    /// deadline, after which drop aborts it.
    async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        for handle in &mut self.handles {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(Ok(()))) => debug!("callback listener closed"),
                Ok(Ok(Err(e))) => warn!(error = %e, "callback listener failed"),
                Ok(Err(e)) => warn!(error = %e, "callback listener task ended abnormally"),
                Err(_) => debug!("callback listener drain timed out, aborting"),
            }
        }
    }
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

#[derive(Clone)]
struct CallbackState {
    sender: Arc<Mutex<Option<oneshot::Sender<CallbackOutcome>>>>,
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

fn callback_router(path: &str, sender: oneshot::Sender<CallbackOutcome>) -> Router {
    let state = CallbackState {
        sender: Arc::new(Mutex::new(Some(sender))),
    };
    Router::new()
        .route(path, get(handle_redirect))
        .fallback(unmatched)
        .with_state(state)
}

fn plain_text(status: StatusCode, body: &'static str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

async fn handle_redirect(
    State(state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let outcome = match (params.code, params.error) {
        (_, Some(error)) => Err(Error::AuthorizationDenied(match params.error_description {
            Some(description) => format!("{error}: {description}"),
            None => error,
        })),
        (Some(code), None) if !code.is_empty() => Ok(code),
        _ => {
            debug!("redirect without code or error, still waiting");
            return plain_text(StatusCode::BAD_REQUEST, "Missing authorization code.");
        }
    };

    let Some(sender) = state.sender.lock().await.take() else {
        debug!("redirect after the flow completed, ignoring");
        return plain_text(
            StatusCode::GONE,
            "This authorization request has already been handled.",
        );
    };

    let response = match &outcome {
        Ok(_) => {
            info!("authorization code received");
            plain_text(StatusCode::OK, CALLBACK_SUCCESS_MESSAGE)
        }
        Err(e) => {
            warn!(error = %e, "authorization was not granted");
            plain_text(StatusCode::BAD_REQUEST, CALLBACK_DENIED_MESSAGE)
        }
    };
    let _ = sender.send(outcome);
    response
}

/// Never answers; the request stays open until the listener closes.
async fn unmatched(uri: Uri) -> StatusCode {
    debug!(path = uri.path(), "ignoring request outside the redirect path");
    std::future::pending().await
}
