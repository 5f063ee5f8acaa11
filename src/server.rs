//! HTTP surface: the webhook, snapshot downloads and the admin routes.

use anyhow::{anyhow, Context, Result};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Tls;
use crate::db::{self, Pool};
use crate::handlers::Dispatcher;
use crate::line::model::WebhookBody;
use crate::line::{verify_signature, LineApi, Message, SignatureError, SIGNATURE_HEADER};
use crate::snapshot::SnapshotStore;

/// Application state shared across routes.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub line: Arc<dyn LineApi>,
    pub store: SnapshotStore,
    pub pool: Pool,
    pub channel_secret: Arc<str>,
}

pub fn router(state: AppState, enable_admin: bool) -> Router {
    let mut app = Router::new()
        .route("/", post(webhook))
        .route("/data/:file", get(data_file));
    if enable_admin {
        app = app
            .route("/push/:id/:message", get(push))
            .route("/profile/:id", get(profile))
            .route("/god", get(god));
    }
    app.layer(middleware::map_response(powered_by))
        .with_state(state)
}

async fn powered_by(mut res: Response) -> Response {
    res.headers_mut()
        .insert("x-powered-by", HeaderValue::from_static("Electricity"));
    res
}

fn failure(status: StatusCode, reason: &str, message: impl Into<String>) -> Response {
    let body = json!({ "success": false, "reason": reason, "message": message.into() });
    (status, Json(body)).into_response()
}

/// Verifies the signature, acknowledges, then handles events off the request.
#[instrument(skip_all)]
async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let checked = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(SignatureError::Missing)
        .and_then(|sig| verify_signature(&state.channel_secret, &body, sig));
    if let Err(err) = checked {
        warn!(%err, "rejected webhook");
        return failure(StatusCode::UNAUTHORIZED, "Invalid signature", err.to_string());
    }

    let parsed: WebhookBody = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(%err, "unparseable webhook body");
            return failure(StatusCode::BAD_REQUEST, "Invalid body", err.to_string());
        }
    };
    debug!(events = parsed.events.len(), "webhook accepted");

    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        dispatcher.handle_webhook(parsed).await;
    });
    Json(json!({ "success": true })).into_response()
}

fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

async fn data_file(State(state): State<AppState>, Path(file): Path<String>) -> Response {
    const REASON: &str = "An error occured while read file.";
    if !is_safe_file_name(&file) {
        return failure(StatusCode::NOT_FOUND, REASON, "invalid file name");
    }
    match state.store.read_value(&format!("{}.json", file)).await {
        Ok(value) => Json(value).into_response(),
        Err(err) => {
            warn!(%err, "data file unavailable");
            failure(StatusCode::NOT_FOUND, REASON, err.to_string())
        }
    }
}

async fn resolve(state: &AppState, short_id: &str) -> Result<String, Response> {
    match db::resolve_short_id(&state.pool, short_id).await {
        Ok(Some(native)) => Ok(native),
        Ok(None) => Err(failure(StatusCode::NOT_FOUND, "Unknown id", short_id)),
        Err(err) => {
            error!(?err, "short id lookup failed");
            Err(failure(StatusCode::INTERNAL_SERVER_ERROR, "Lookup failed", ""))
        }
    }
}

async fn push(
    State(state): State<AppState>,
    Path((id, message)): Path<(String, String)>,
) -> Response {
    let native = match resolve(&state, &id).await {
        Ok(native) => native,
        Err(res) => return res,
    };
    match state.line.push(&native, &[Message::text(message)]).await {
        Ok(()) => {
            info!(short_id = %id, "pushed message");
            Json(json!({ "success": true })).into_response()
        }
        Err(err) => {
            warn!(?err, short_id = %id, "push failed");
            failure(StatusCode::BAD_GATEWAY, "Push failed", "")
        }
    }
}

async fn profile(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let native = match resolve(&state, &id).await {
        Ok(native) => native,
        Err(res) => return res,
    };
    match state.line.profile(&native).await {
        Ok(profile) => Json(profile).into_response(),
        Err(err) => {
            warn!(?err, short_id = %id, "profile lookup failed");
            failure(StatusCode::BAD_GATEWAY, "Profile lookup failed", "")
        }
    }
}

async fn god(State(state): State<AppState>) -> Response {
    match db::list_short_ids(&state.pool).await {
        Ok(ids) => {
            let muted = state.dispatcher.state().muted().await;
            Json(json!({ "shortIds": ids, "muted": muted })).into_response()
        }
        Err(err) => {
            error!(?err, "listing short ids failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Lookup failed", "")
        }
    }
}

/// Serve `app` on `addr`, over TLS when `tls` is configured.
pub async fn serve(addr: SocketAddr, app: Router, tls: Option<&Tls>) -> Result<()> {
    let acceptor = match tls {
        Some(tls) => Some(load_tls(tls).await?),
        None => None,
    };
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    match acceptor {
        None => {
            info!(%addr, "listening (plain http)");
            axum::serve(listener, app).await?;
        }
        Some(acceptor) => {
            info!(%addr, "listening (https)");
            serve_tls(listener, app, acceptor).await;
        }
    }
    Ok(())
}

/// Out of file descriptors (EMFILE/ENFILE) backs off longer than a dropped peer.
fn accept_retry_delay(err: &std::io::Error) -> Duration {
    match err.raw_os_error() {
        Some(23) | Some(24) => Duration::from_secs(1),
        _ => Duration::from_millis(50),
    }
}

async fn serve_tls(listener: TcpListener, app: Router, acceptor: TlsAcceptor) {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                let delay = accept_retry_delay(&err);
                warn!(?err, ?delay, "accept failed");
                tokio::time::sleep(delay).await;
                continue;
            }
        };
        let acceptor = acceptor.clone();
        let app = app.clone();
        tokio::spawn(async move {
            let stream = match acceptor.accept(socket).await {
                Ok(stream) => stream,
                Err(err) => {
                    debug!(?err, %peer, "tls handshake failed");
                    return;
                }
            };
            let service = hyper::service::service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                app.clone().oneshot(req)
            });
            if let Err(err) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(?err, %peer, "connection closed with error");
            }
        });
    }
}

/// Missing or malformed PEM files are fatal at startup.
pub async fn load_tls(tls: &Tls) -> Result<TlsAcceptor> {
    let cert_pem = tokio::fs::read(&tls.cert)
        .await
        .with_context(|| format!("failed to read tls cert {}", tls.cert))?;
    let key_pem = tokio::fs::read(&tls.key)
        .await
        .with_context(|| format!("failed to read tls key {}", tls.key))?;

    let mut certs = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .context("invalid tls cert")?;
    if let Some(ca) = &tls.ca {
        let ca_pem = tokio::fs::read(ca)
            .await
            .with_context(|| format!("failed to read tls ca {}", ca))?;
        let chain = rustls_pemfile::certs(&mut ca_pem.as_slice())
            .collect::<Result<Vec<_>, _>>()
            .context("invalid tls ca")?;
        certs.extend(chain);
    }
    if certs.is_empty() {
        return Err(anyhow!("no certificates in {}", tls.cert));
    }
    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .context("invalid tls key")?
        .ok_or_else(|| anyhow!("no private key in {}", tls.key))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("invalid tls material")?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_restricted() {
        assert!(is_safe_file_name("aqx"));
        assert!(is_safe_file_name("pm-site"));
        assert!(!is_safe_file_name(""));
        assert!(!is_safe_file_name("../config"));
        assert!(!is_safe_file_name("a.b"));
    }

    #[test]
    fn failed_accept_always_waits() {
        let dropped = std::io::Error::from(std::io::ErrorKind::ConnectionAborted);
        assert_eq!(accept_retry_delay(&dropped), Duration::from_millis(50));
        let exhausted = std::io::Error::from_raw_os_error(24);
        assert_eq!(accept_retry_delay(&exhausted), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn missing_tls_files_fail() {
        let tls = Tls {
            ca: None,
            cert: "/nonexistent/cert.pem".into(),
            key: "/nonexistent/key.pem".into(),
        };
        let err = load_tls(&tls).await.err().unwrap();
        assert!(err.to_string().contains("tls cert"));
    }
}
