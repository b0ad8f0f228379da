//! HTTP/WebSocket frontend.
//!
//! Static content is served from the configured html root; any valid
//! WebSocket upgrade, regardless of path, joins the message fan-out.

pub mod queue;
pub mod ws;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::bridge::{OutboundMsg, RxQueue};

/// Shared state for the web layer.
pub struct WebState {
    pub bus: broadcast::Sender<OutboundMsg>,
    pub rx: Arc<RxQueue>,
    pub html_root: PathBuf,
}

/// Web server handle. Spawns a dedicated thread with its own tokio runtime,
/// stopped via a oneshot signal.
pub struct WebServer {
    addr: SocketAddr,
    state: Arc<WebState>,
    shutdown_tx: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
}

impl WebServer {
    pub fn new(
        addr: SocketAddr,
        html_root: PathBuf,
        bus: broadcast::Sender<OutboundMsg>,
        rx: Arc<RxQueue>,
    ) -> Self {
        Self {
            addr,
            state: Arc::new(WebState {
                bus,
                rx,
                html_root,
            }),
            shutdown_tx: Mutex::new(None),
        }
    }

    pub fn start(&self) {
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        *self.shutdown_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(shutdown_tx);

        let addr = self.addr;
        let state = Arc::clone(&self.state);
        std::thread::Builder::new()
            .name("airlink-web".into())
            .spawn(move || {
                let rt =
                    tokio::runtime::Runtime::new().expect("failed to create web tokio runtime");
                rt.block_on(run(addr, state, shutdown_rx));
            })
            .expect("failed to spawn web thread");
    }

    pub fn stop(&self) {
        if let Some(tx) = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            let _ = tx.send(());
        }
    }
}

async fn run(
    addr: SocketAddr,
    state: Arc<WebState>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    let app = Router::new()
        .fallback(handle_request)
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Retry bind until success or shutdown.
    let mut shutdown_rx = shutdown_rx;
    let listener = loop {
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => break listener,
            Err(e) => {
                warn!("web server: failed to bind {addr}: {e}, retrying in 3s");
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_secs(3)) => continue,
                    _ = &mut shutdown_rx => return,
                }
            }
        }
    };

    info!("Running http/ws server on {addr}");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        drop(shutdown_rx.await);
    })
    .await
    .ok();
}

async fn handle_request(
    State(state): State<Arc<WebState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if let Ok(upgrade) = upgrade {
        let state = Arc::clone(&state);
        return upgrade.on_upgrade(move |socket| ws::handle_socket(socket, state, peer));
    }
    serve_static(&state, &method, &uri, peer).await
}

async fn serve_static(state: &WebState, method: &Method, uri: &Uri, peer: SocketAddr) -> Response {
    let path = uri.path();
    if !path.starts_with('/') || path.contains("..") {
        log_response(method, path, 400, peer);
        return StatusCode::BAD_REQUEST.into_response();
    }
    if *method != Method::GET && *method != Method::HEAD {
        log_response(method, path, 400, peer);
        return StatusCode::BAD_REQUEST.into_response();
    }

    let mut file_path = state.html_root.join(path.trim_start_matches('/'));
    if path.ends_with('/') {
        file_path.push("index.html");
    }

    match tokio::fs::read(&file_path).await {
        Ok(contents) => {
            log_response(method, path, 200, peer);
            let headers = [
                (header::CONTENT_TYPE, mime_for(&file_path).to_owned()),
                (header::CONTENT_LENGTH, contents.len().to_string()),
            ];
            if *method == Method::HEAD {
                (headers, axum::body::Body::empty()).into_response()
            } else {
                (headers, contents).into_response()
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log_response(method, path, 404, peer);
            StatusCode::NOT_FOUND.into_response()
        }
        Err(e) => {
            warn!("failed to read {}: {e}", file_path.display());
            log_response(method, path, 500, peer);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn log_response(method: &Method, path: &str, status: u16, peer: SocketAddr) {
    info!("HTTP {method} {path} {status} - {peer}");
}

fn mime_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html",
        Some("js") => "text/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("wasm") => "application/wasm",
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}
