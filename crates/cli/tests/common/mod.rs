#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use randevu::page::fake::{PortalScript, ScriptedFactory};
use randevu::{Engine, EngineConfig};
use randevu_cli::server::{AppState, router};
use randevu_cli::store::{MonitorStore, PatientStore};
use randevu_protocol::{Patient, PatientDraft};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub struct Server {
	pub addr: SocketAddr,
	pub state: AppState,
	pub factory: Arc<ScriptedFactory>,
	pub patient: Patient,
	pub dir: TempDir,
}

pub async fn start(script: PortalScript) -> Server {
	start_with(script, EngineConfig::for_tests()).await
}

/// Serves a scripted portal with one registered patient on an ephemeral port.
pub async fn start_with(script: PortalScript, config: EngineConfig) -> Server {
	let dir = TempDir::new().expect("temp dir should be created");
	let store = PatientStore::open(dir.path().join("patients.json")).expect("store should open");
	let patient = store
		.create(PatientDraft {
			name: "Ayşe Yılmaz".into(),
			identity_number: "10000000146".into(),
			birth_date: "05.03.1990".into(),
			phone: None,
		})
		.expect("patient should be created");

	let factory = Arc::new(ScriptedFactory::new(script));
	let engine = Arc::new(Engine::new(config, factory.clone()));
	let monitors = MonitorStore::open(dir.path().join("monitors.json")).expect("monitor store should open");
	let state = AppState::new(engine, Arc::new(store), Arc::new(monitors));
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("listener should bind");
	let addr = listener.local_addr().expect("listener should have an address");
	let app = router(state.clone());
	tokio::spawn(async move {
		axum::serve(listener, app).await.expect("server should run");
	});

	Server {
		addr,
		state,
		factory,
		patient,
		dir,
	}
}

/// Minimal HTTP/1.1 exchange; returns the status code and body.
pub async fn http(addr: SocketAddr, method: &str, path: &str, body: Option<&str>) -> (u16, Vec<u8>) {
	let mut stream = TcpStream::connect(addr).await.expect("connect should succeed");
	let body = body.unwrap_or("");
	let request = format!(
		"{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
		body.len()
	);
	stream.write_all(request.as_bytes()).await.expect("request should be written");

	let mut raw = Vec::new();
	tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut raw))
		.await
		.expect("response should arrive")
		.expect("response should be read");

	let split = raw.windows(4).position(|w| w == b"\r\n\r\n").expect("response should have headers");
	let head = String::from_utf8_lossy(&raw[..split]).to_string();
	let status = head
		.split_whitespace()
		.nth(1)
		.and_then(|code| code.parse().ok())
		.expect("status line should carry a code");
	(status, raw[split + 4..].to_vec())
}

pub async fn http_json(addr: SocketAddr, method: &str, path: &str, body: Option<&str>) -> (u16, serde_json::Value) {
	let (status, body) = http(addr, method, path, body).await;
	let value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
	(status, value)
}
