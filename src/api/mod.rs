//! Loopback control API.
//!
//! A minimal HTTP server bound to a loopback address, protected by a
//! random capability token. It exposes the two external operations the
//! system has: start a processing session and list persisted incidents,
//! plus session status/stop for operators. Processing itself runs on
//! session threads; the API never blocks on a session.

use anyhow::{anyhow, Result};
use rand::RngCore;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::ingest::SourceSpec;
use crate::record::list_incidents;
use crate::session::{SessionHandle, SessionStatus};

const MAX_REQUEST_BYTES: usize = 8192;

/// Builds a fully wired session for a parsed source. The daemon supplies
/// this; each call loads fresh models and state for the new session.
pub type SessionFactory = Box<dyn Fn(SourceSpec) -> Result<SessionHandle> + Send>;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub token_path: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8811".to_string(),
            token_path: None,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    pub token: String,
    pub token_path: Option<PathBuf>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct SessionInfo {
    id: String,
    source: String,
    #[serde(flatten)]
    status: SessionStatus,
}

/// Registry of live session handles, shared between the API thread and the
/// daemon's shutdown path.
#[derive(Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: SessionHandle) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(handle.id.clone(), handle);
        }
    }

    pub fn request_stop(&self, id: &str) -> bool {
        match self.sessions.lock() {
            Ok(sessions) => match sessions.get(id) {
                Some(handle) => {
                    handle.request_stop();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Stop every session and wait for the threads to finish.
    pub fn stop_all(&self) {
        let Ok(mut sessions) = self.sessions.lock() else {
            return;
        };
        for (_, mut handle) in sessions.drain() {
            if let Err(e) = handle.stop() {
                log::warn!("session {} failed to join: {}", handle.id, e);
            }
        }
    }

    fn infos(&self) -> Vec<SessionInfo> {
        match self.sessions.lock() {
            Ok(sessions) => {
                let mut infos: Vec<SessionInfo> = sessions
                    .values()
                    .map(|handle| SessionInfo {
                        id: handle.id.clone(),
                        source: handle.spec.to_string(),
                        status: handle.status(),
                    })
                    .collect();
                infos.sort_by(|a, b| a.id.cmp(&b.id));
                infos
            }
            Err(_) => Vec::new(),
        }
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    db_path: String,
    manager: Arc<SessionManager>,
    factory: SessionFactory,
}

impl ApiServer {
    pub fn new(
        cfg: ApiConfig,
        db_path: String,
        manager: Arc<SessionManager>,
        factory: SessionFactory,
    ) -> Self {
        Self {
            cfg,
            db_path,
            manager,
            factory,
        }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let token = generate_token();
        if let Some(path) = &self.cfg.token_path {
            write_token_file(path, &token)?;
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let token_path = self.cfg.token_path.clone();
        let expected_token = token.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, self, expected_token, shutdown_thread) {
                log::error!("control api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            token,
            token_path,
            shutdown,
            join: Some(join),
        })
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn run_api(
    listener: TcpListener,
    server: ApiServer,
    expected_token: String,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &server, &expected_token) {
                    log::warn!("control api request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    server: &ApiServer,
    expected_token: &str,
) -> Result<()> {
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json_response(&mut stream, 403, r#"{"error":"forbidden"}"#)?;
        return Ok(());
    }

    let request = read_request(&mut stream)?;

    if request.method == "GET" && request.path == "/health" {
        write_json_response(&mut stream, 200, r#"{"status":"ok"}"#)?;
        return Ok(());
    }

    if request.has_query_token() {
        write_json_response(
            &mut stream,
            400,
            r#"{"error":"token_query_param_not_allowed"}"#,
        )?;
        return Ok(());
    }
    let token = match request.bearer_token() {
        Some(token) => token,
        None => {
            write_json_response(&mut stream, 401, r#"{"error":"missing_token"}"#)?;
            return Ok(());
        }
    };
    if token != expected_token {
        write_json_response(&mut stream, 401, r#"{"error":"invalid_token"}"#)?;
        return Err(anyhow!("capability token mismatch"));
    }

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/incidents") => {
            let incidents = list_incidents(&server.db_path)?;
            let payload = serde_json::to_vec(&serde_json::json!({ "incidents": incidents }))?;
            write_response(&mut stream, 200, "application/json", &payload)?;
        }
        ("GET", "/sessions") => {
            let payload = serde_json::to_vec(&server.manager.infos())?;
            write_response(&mut stream, 200, "application/json", &payload)?;
        }
        ("POST", "/sessions") => {
            let body = String::from_utf8_lossy(&request.body);
            let spec = match SourceSpec::parse(&body) {
                Ok(spec) => spec,
                Err(e) => {
                    log::warn!("{}: session start rejected: {}", crate::FaultKind::InvalidInput, e);
                    write_json_response(&mut stream, 400, r#"{"error":"invalid_input"}"#)?;
                    return Ok(());
                }
            };
            match (server.factory)(spec) {
                Ok(handle) => {
                    let payload = serde_json::to_vec(&serde_json::json!({
                        "id": handle.id,
                        "state": "running",
                    }))?;
                    server.manager.insert(handle);
                    write_response(&mut stream, 200, "application/json", &payload)?;
                }
                Err(e) => {
                    log::error!("session start failed: {:#}", e);
                    write_json_response(&mut stream, 500, r#"{"error":"source_unavailable"}"#)?;
                }
            }
        }
        ("POST", path) => {
            let Some(id) = path
                .strip_prefix("/sessions/")
                .and_then(|rest| rest.strip_suffix("/stop"))
            else {
                write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#)?;
                return Ok(());
            };
            if server.manager.request_stop(id) {
                write_json_response(&mut stream, 200, r#"{"status":"stopping"}"#)?;
            } else {
                write_json_response(&mut stream, 404, r#"{"error":"unknown_session"}"#)?;
            }
        }
        _ => {
            write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#)?;
        }
    }
    Ok(())
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let headers_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break data
                .windows(4)
                .position(|w| w == b"\r\n\r\n")
                .ok_or_else(|| anyhow!("truncated request"))?;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let header_text = String::from_utf8_lossy(&data[..headers_end]).into_owned();
    let mut lines = header_text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .map(|v| v.parse())
        .transpose()
        .map_err(|_| anyhow!("invalid content-length"))?
        .unwrap_or(0);
    if content_length > MAX_REQUEST_BYTES {
        return Err(anyhow!("request body too large"));
    }
    let mut body = data[headers_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("truncated request body"));
        }
        body.extend_from_slice(&buf[..n]);
        if body.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request body too large"));
        }
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        raw_path: raw_path.to_string(),
        body,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        401 => "HTTP/1.1 401 Unauthorized",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    raw_path: String,
    body: Vec<u8>,
}

impl HttpRequest {
    fn bearer_token(&self) -> Option<String> {
        if let Some(value) = self.headers.get("authorization") {
            let parts: Vec<&str> = value.split_whitespace().collect();
            if parts.len() == 2 && parts[0].eq_ignore_ascii_case("bearer") {
                return Some(parts[1].to_string());
            }
        }
        None
    }

    fn has_query_token(&self) -> bool {
        if let Some(query) = self.raw_path.split('?').nth(1) {
            for pair in query.split('&') {
                if let Some((k, _)) = pair.split_once('=') {
                    if k == "token" {
                        return true;
                    }
                }
            }
        }
        false
    }
}

fn write_token_file(path: &Path, token: &str) -> Result<()> {
    std::fs::write(path, format!("{token}\n"))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}
