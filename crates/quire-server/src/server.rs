//! Development server implementation.

use std::path::PathBuf;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::services::ServeDir;

use crate::websocket::{
    reload_client_script, ReloadHub, ReloadMessage, RELOAD_SCRIPT_PATH, RELOAD_SOCKET_PATH,
};

/// Largest HTML page the injection middleware will buffer.
const MAX_HTML_BYTES: usize = 16 * 1024 * 1024;

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Directory being served
    pub root: PathBuf,

    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Open browser on start
    pub open: bool,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("_site"),
            host: "127.0.0.1".to_string(),
            port: 4000,
            open: false,
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(std::io::Error),
}

/// Development server.
pub struct DevServer {
    config: DevServerConfig,
    hub: ReloadHub,
}

impl DevServer {
    pub fn new(config: DevServerConfig, hub: ReloadHub) -> Self {
        Self { config, hub }
    }

    /// Routes: the reload socket and script, everything else from the build
    /// directory.
    pub fn router(&self) -> Router {
        let files = ServeDir::new(&self.config.root).append_index_html_on_directories(true);

        Router::new()
            .route(RELOAD_SOCKET_PATH, get(ws_handler))
            .route(RELOAD_SCRIPT_PATH, get(script_handler))
            .fallback_service(files)
            .layer(middleware::from_fn(inject_reload_script))
            .with_state(self.hub.clone())
    }

    /// Bind and serve until the process exits.
    pub async fn start(self) -> Result<(), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;

        let url = format!("http://{}", addr);
        tracing::info!(root = %self.config.root.display(), "serving at {}", url);

        if self.config.open {
            if let Err(e) = open::that(&url) {
                tracing::warn!("cannot open browser: {}", e);
            }
        }

        axum::serve(listener, self.router())
            .await
            .map_err(ServerError::Serve)
    }
}

/// Insert the reload script tag before the closing `</body>`, or append it
/// when the page has none.
pub fn inject_script(html: &str) -> String {
    let tag = format!(r#"<script src="{}"></script>"#, RELOAD_SCRIPT_PATH);
    // ASCII lowercasing keeps byte offsets intact.
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(at) => format!("{}{}{}", &html[..at], tag, &html[at..]),
        None => format!("{}{}", html, tag),
    }
}

async fn inject_reload_script(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if response.status() != StatusCode::OK || !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_HTML_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("cannot buffer page for live reload: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_script(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<ReloadHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, hub))
}

async fn handle_ws(mut socket: WebSocket, hub: ReloadHub) {
    let mut rx = hub.subscribe();

    if send(&mut socket, &ReloadMessage::Connected).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Ok(msg) => {
                    if send(&mut socket, &msg).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "live reload client lagged");
                    if send(&mut socket, &ReloadMessage::Reload).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn send(socket: &mut WebSocket, msg: &ReloadMessage) -> Result<(), ()> {
    let json = msg.to_json().map_err(|_| ())?;
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

async fn script_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        reload_client_script(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn injects_before_closing_body() {
        let html = inject_script("<html><body><p>hi</p></BODY></html>");

        assert_eq!(
            html,
            r#"<html><body><p>hi</p><script src="/__livereload.js"></script></BODY></html>"#
        );
    }

    #[test]
    fn appends_when_body_is_missing() {
        let html = inject_script("<p>fragment</p>");

        assert!(html.ends_with(r#"<script src="/__livereload.js"></script>"#));
    }

    async fn serve(root: PathBuf) -> String {
        let server = DevServer::new(
            DevServerConfig {
                root,
                ..DevServerConfig::default()
            },
            ReloadHub::new(),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = server.router();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn serves_build_dir_with_reload_script() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("css")).unwrap();
        fs::write(
            temp.path().join("index.html"),
            "<html><body><h1>Blog</h1></body></html>",
        )
        .unwrap();
        fs::write(temp.path().join("css/main.css"), "body{}").unwrap();
        let base = serve(temp.path().to_path_buf()).await;
        let client = reqwest::Client::new();

        let page = client.get(format!("{}/", base)).send().await.unwrap();
        assert!(page.status().is_success());
        let body = page.text().await.unwrap();
        assert!(body.contains(r#"<script src="/__livereload.js"></script></body>"#));

        let css = client
            .get(format!("{}/css/main.css", base))
            .send()
            .await
            .unwrap();
        assert_eq!(css.text().await.unwrap(), "body{}");

        let script = client
            .get(format!("{}/__livereload.js", base))
            .send()
            .await
            .unwrap();
        assert!(script.text().await.unwrap().contains("WebSocket"));
    }

    #[tokio::test]
    async fn missing_pages_are_not_touched() {
        let temp = tempdir().unwrap();
        let base = serve(temp.path().to_path_buf()).await;

        let response = reqwest::Client::new()
            .get(format!("{}/nope.html", base))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    }
}
