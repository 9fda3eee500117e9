//! End-to-end exercise of the control API: session start/list/stop and
//! incident listing over real loopback HTTP.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use sentinel_kernel::api::{ApiConfig, ApiServer, SessionFactory, SessionManager};
use sentinel_kernel::config::{FusionSettings, IngestSettings};
use sentinel_kernel::perception::stub::stub_adapter;
use sentinel_kernel::record::{IncidentRecorder, SqliteIncidentStore};
use sentinel_kernel::Session;

fn http(addr: std::net::SocketAddr, request: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).expect("connect api");
    stream
        .set_read_timeout(Some(Duration::from_secs(3)))
        .unwrap();
    stream.write_all(request.as_bytes()).expect("send request");
    let mut response = String::new();
    stream.read_to_string(&mut response).expect("read response");
    let status: u16 = response
        .split_whitespace()
        .nth(1)
        .expect("status code")
        .parse()
        .expect("numeric status");
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

fn get(addr: std::net::SocketAddr, path: &str, token: Option<&str>) -> (u16, String) {
    let auth = token
        .map(|t| format!("Authorization: Bearer {}\r\n", t))
        .unwrap_or_default();
    http(
        addr,
        &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n{auth}Connection: close\r\n\r\n"),
    )
}

fn post(addr: std::net::SocketAddr, path: &str, token: &str, body: &str) -> (u16, String) {
    http(
        addr,
        &format!(
            "POST {path} HTTP/1.1\r\nHost: localhost\r\nAuthorization: Bearer {token}\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n{body}",
            len = body.len()
        ),
    )
}

#[test]
fn session_lifecycle_over_the_api() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("incidents.db");
    let db_path = db_path.to_str().unwrap().to_string();
    // Create the index up front so listing works before any alert fires.
    SqliteIncidentStore::open(&db_path).unwrap();

    let snapshot_dir = dir.path().join("snapshots");
    let manager = Arc::new(SessionManager::new());
    let factory_db = db_path.clone();
    let factory: SessionFactory = Box::new(move |spec| {
        let store = SqliteIncidentStore::open(&factory_db)?;
        let recorder = IncidentRecorder::new(snapshot_dir.clone(), Box::new(store));
        Session::spawn(
            spec,
            &IngestSettings {
                target_fps: 200,
                width: 64,
                height: 48,
            },
            FusionSettings::default(),
            stub_adapter(),
            recorder,
            Vec::new(),
        )
    });

    let api = ApiServer::new(
        ApiConfig {
            addr: "127.0.0.1:0".to_string(),
            token_path: None,
        },
        db_path,
        manager.clone(),
        factory,
    )
    .spawn()
    .expect("api spawns");
    let addr = api.addr;
    let token = api.token.clone();

    // Health needs no token.
    let (status, body) = get(addr, "/health", None);
    assert_eq!(status, 200);
    assert!(body.contains("ok"));

    // Everything else does.
    let (status, _) = get(addr, "/sessions", None);
    assert_eq!(status, 401);
    let (status, _) = get(addr, "/sessions", Some("deadbeef"));
    assert_eq!(status, 401);

    // Empty source is invalid input, rejected before any session starts.
    let (status, body) = post(addr, "/sessions", &token, "   ");
    assert_eq!(status, 400);
    assert!(body.contains("invalid_input"));

    // Start a real (stub) session.
    let (status, body) = post(addr, "/sessions", &token, "stub://lobby");
    assert_eq!(status, 200);
    let started: serde_json::Value = serde_json::from_str(&body).unwrap();
    let id = started["id"].as_str().expect("session id").to_string();

    let (status, body) = get(addr, "/sessions", Some(&token));
    assert_eq!(status, 200);
    let sessions: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(sessions[0]["id"], id.as_str());
    assert_eq!(sessions[0]["state"], "running");

    // No incidents persisted by the quiet stub scene.
    let (status, body) = get(addr, "/incidents", Some(&token));
    assert_eq!(status, 200);
    let incidents: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(incidents["incidents"].as_array().unwrap().len(), 0);

    // Stop it and watch the status settle.
    let (status, _) = post(addr, &format!("/sessions/{}/stop", id), &token, "");
    assert_eq!(status, 200);
    let mut stopped = false;
    for _ in 0..100 {
        let (_, body) = get(addr, "/sessions", Some(&token));
        let sessions: serde_json::Value = serde_json::from_str(&body).unwrap();
        if sessions[0]["state"] == "stopped" {
            stopped = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(stopped, "session should stop after the explicit stop signal");

    let (status, _) = post(addr, "/sessions/sess-none/stop", &token, "");
    assert_eq!(status, 404);

    manager.stop_all();
    api.stop().expect("api stops");
}
