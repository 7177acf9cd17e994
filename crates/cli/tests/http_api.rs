mod common;

use common::*;
use randevu::EngineConfig;
use randevu::page::fake::PortalScript;
use serde_json::json;

#[tokio::test]
async fn health_reports_ok() {
	let server = start(PortalScript::default()).await;
	let (status, body) = http_json(server.addr, "GET", "/health", None).await;
	assert_eq!(status, 200);
	assert_eq!(body["status"], "ok");
	assert_eq!(body["sessions"], 0);
}

#[tokio::test]
async fn patient_records_round_trip_through_the_api() {
	let server = start(PortalScript::default()).await;
	let addr = server.addr;

	let draft = json!({"name": "Mehmet Demir", "tc_kimlik": "20000000046", "dogum_tarihi": "01.01.1980"}).to_string();
	let (status, created) = http_json(addr, "POST", "/api/patients", Some(&draft)).await;
	assert_eq!(status, 201);
	assert_eq!(created["id"], 2);
	assert_eq!(created["identity_number"], "20000000046");

	let (status, body) = http_json(addr, "POST", "/api/patients", Some(&draft)).await;
	assert_eq!(status, 400);
	assert_eq!(body["error"]["code"], "INVALID_REQUEST");

	let (status, list) = http_json(addr, "GET", "/api/patients", None).await;
	assert_eq!(status, 200);
	assert_eq!(list.as_array().map(Vec::len), Some(2));

	let patch = json!({"phone": "5550001122"}).to_string();
	let (status, updated) = http_json(addr, "PUT", "/api/patients/2", Some(&patch)).await;
	assert_eq!(status, 200);
	assert_eq!(updated["phone"], "5550001122");
	assert_eq!(updated["name"], "Mehmet Demir");

	let (status, body) = http_json(addr, "PUT", "/api/patients/42", Some(&patch)).await;
	assert_eq!(status, 404);
	assert_eq!(body["error"]["code"], "PATIENT_NOT_FOUND");

	let (status, _) = http_json(addr, "DELETE", "/api/patients/2", None).await;
	assert_eq!(status, 200);
	assert!(server.state.store.get(randevu_protocol::PatientId(2)).is_none());
}

#[tokio::test]
async fn session_endpoints_report_and_close() {
	let server = start(PortalScript::default()).await;
	let (status, body) = http_json(server.addr, "GET", "/api/sessions/1", None).await;
	assert_eq!(status, 200);
	assert_eq!(body, json!({"active": false, "logged_in": false, "idle_seconds": 0}));

	let (status, body) = http_json(server.addr, "DELETE", "/api/sessions/1", None).await;
	assert_eq!(status, 200);
	assert_eq!(body["closed"], false);
}

#[tokio::test]
async fn screenshots_are_served_from_the_artifacts_dir() {
	let artifacts = tempfile::TempDir::new().unwrap();
	std::fs::write(artifacts.path().join("latest.png"), b"\x89PNG latest").unwrap();
	std::fs::write(artifacts.path().join("notes.txt"), b"not an image").unwrap();
	let config = EngineConfig::for_tests().with_artifacts_dir(artifacts.path());
	let server = start_with(PortalScript::default(), config).await;
	let addr = server.addr;

	let (status, body) = http(addr, "GET", "/api/screenshot", None).await;
	assert_eq!(status, 200);
	assert_eq!(body, b"\x89PNG latest");

	let (status, body) = http(addr, "GET", "/api/screenshot/latest.png", None).await;
	assert_eq!(status, 200);
	assert_eq!(body, b"\x89PNG latest");

	assert_eq!(http(addr, "GET", "/api/screenshot/notes.txt", None).await.0, 400);
	assert_eq!(http(addr, "GET", "/api/screenshot/..latest.png", None).await.0, 400);
	assert_eq!(http(addr, "GET", "/api/screenshot/missing.png", None).await.0, 404);
}

#[tokio::test]
async fn missing_latest_screenshot_is_not_found() {
	let artifacts = tempfile::TempDir::new().unwrap();
	let config = EngineConfig::for_tests().with_artifacts_dir(artifacts.path());
	let server = start_with(PortalScript::default(), config).await;
	let (status, body) = http_json(server.addr, "GET", "/api/screenshot", None).await;
	assert_eq!(status, 404);
	assert_eq!(body["error"]["code"], "NOT_FOUND");
}
