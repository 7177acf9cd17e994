mod common;

use std::time::Duration;

use common::*;
use futures::{SinkExt, StreamExt};
use randevu::EngineConfig;
use randevu::page::CellState;
use randevu::page::fake::{CaptchaScript, CategoryScript, PortalScript};
use randevu_protocol::{ErrorCode, OutcomeStatus, PatientId, ServerMessage, Step};
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn portal() -> PortalScript {
	PortalScript::default().with_category(
		CategoryScript::new("Kardiyoloji")
			.cell("26.02.2026", "16:00", CellState::Open)
			.subtimes("26.02.2026", "16:00", &["16:10", "16:20"]),
	)
}

async fn connect(server: &Server) -> Client {
	let (client, _) = connect_async(format!("ws://{}/ws", server.addr)).await.expect("websocket should connect");
	client
}

async fn send(client: &mut Client, value: serde_json::Value) {
	client.send(Message::Text(value.to_string())).await.expect("frame should be sent");
}

async fn recv(client: &mut Client) -> ServerMessage {
	loop {
		let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
			.await
			.expect("a message should arrive in time")
			.expect("connection should stay open")
			.expect("frame should be readable");
		if let Message::Text(text) = frame {
			return serde_json::from_str(&text).expect("server message should parse");
		}
	}
}

/// Collects messages up to and including the next terminal one.
async fn until_terminal(client: &mut Client) -> Vec<ServerMessage> {
	let mut seen = Vec::new();
	loop {
		let msg = recv(client).await;
		let done = msg.is_terminal();
		seen.push(msg);
		if done {
			return seen;
		}
	}
}

async fn wait_for_step(client: &mut Client, wanted: Step) {
	loop {
		match recv(client).await {
			ServerMessage::Status { step, .. } if step == wanted => return,
			msg if msg.is_terminal() => panic!("flow ended before {wanted}: {msg:?}"),
			_ => {}
		}
	}
}

fn search(patient: PatientId) -> serde_json::Value {
	json!({"action": "search", "patient_id": patient, "randevu_type": "Kardiyoloji"})
}

#[tokio::test]
async fn search_streams_progress_then_result_then_session_status() {
	let server = start(portal()).await;
	let mut client = connect(&server).await;

	send(&mut client, search(server.patient.id)).await;
	let events = until_terminal(&mut client).await;
	assert!(events.len() > 1, "status events precede the result");
	let ServerMessage::Result { data } = events.last().unwrap() else {
		panic!("expected a result: {events:?}");
	};
	assert_eq!(data.status, OutcomeStatus::Available);
	assert_eq!(data.probed_subtimes[0].buckets[0].subtimes, vec!["16:10", "16:20"]);

	match recv(&mut client).await {
		ServerMessage::SessionStatus { data } => {
			assert!(data.active);
			assert!(data.logged_in);
		}
		other => panic!("expected session status, got {other:?}"),
	}

	send(&mut client, search(server.patient.id)).await;
	let events = until_terminal(&mut client).await;
	let ServerMessage::Result { data } = events.last().unwrap() else {
		panic!("expected a result: {events:?}");
	};
	assert!(data.session_reused);
	assert_eq!(server.factory.opened(), 1);
}

#[tokio::test]
async fn patient_id_may_be_a_numeric_string() {
	let server = start(portal()).await;
	let mut client = connect(&server).await;
	send(
		&mut client,
		json!({"action": "search", "patient_id": server.patient.id.to_string(), "randevu_type": "Kardiyoloji"}),
	)
	.await;
	let events = until_terminal(&mut client).await;
	assert!(matches!(events.last(), Some(ServerMessage::Result { .. })), "{events:?}");
}

#[tokio::test]
async fn malformed_messages_keep_the_connection_open() {
	let server = start(portal()).await;
	let mut client = connect(&server).await;

	client.send(Message::Text("not json".into())).await.unwrap();
	match recv(&mut client).await {
		ServerMessage::Error { code, .. } => assert_eq!(code, Some(ErrorCode::InvalidRequest)),
		other => panic!("expected an error, got {other:?}"),
	}
	send(&mut client, json!({"action": "dance"})).await;
	assert!(matches!(recv(&mut client).await, ServerMessage::Error { .. }));

	send(&mut client, json!({"action": "ping"})).await;
	assert_eq!(recv(&mut client).await, ServerMessage::Pong);
}

#[tokio::test]
async fn unknown_patient_is_reported() {
	let server = start(portal()).await;
	let mut client = connect(&server).await;
	send(&mut client, search(PatientId(99))).await;
	match recv(&mut client).await {
		ServerMessage::Error { code, message } => {
			assert_eq!(code, Some(ErrorCode::PatientNotFound));
			assert!(message.contains("99"), "{message}");
		}
		other => panic!("expected an error, got {other:?}"),
	}
	assert_eq!(server.factory.opened(), 0);
}

#[tokio::test]
async fn session_queries_and_close() {
	let server = start(portal()).await;
	let mut client = connect(&server).await;
	let id = server.patient.id;

	send(&mut client, json!({"action": "session_status", "patient_id": id})).await;
	match recv(&mut client).await {
		ServerMessage::SessionStatus { data } => assert!(!data.active),
		other => panic!("expected session status, got {other:?}"),
	}

	send(&mut client, search(id)).await;
	until_terminal(&mut client).await;
	assert!(matches!(recv(&mut client).await, ServerMessage::SessionStatus { .. }));

	send(&mut client, json!({"action": "close_session", "patient_id": id})).await;
	assert_eq!(recv(&mut client).await, ServerMessage::SessionClosed { patient_id: Some(id) });
	assert!(!server.state.engine.sessions().status(id).active);
}

#[tokio::test]
async fn slow_session_close_does_not_stall_the_channel() {
	let server = start(portal().with_close_delay(Duration::from_millis(800))).await;
	let mut client = connect(&server).await;
	let id = server.patient.id;

	send(&mut client, search(id)).await;
	until_terminal(&mut client).await;
	assert!(matches!(recv(&mut client).await, ServerMessage::SessionStatus { .. }));

	send(&mut client, json!({"action": "close_session", "patient_id": id})).await;
	send(&mut client, json!({"action": "ping"})).await;
	assert_eq!(recv(&mut client).await, ServerMessage::Pong);
	assert_eq!(recv(&mut client).await, ServerMessage::SessionClosed { patient_id: Some(id) });
}

fn stuck_on_captcha() -> (PortalScript, EngineConfig) {
	let config = EngineConfig {
		captcha_timeout: Duration::from_secs(30),
		..EngineConfig::for_tests()
	}
	.with_interactive(true);
	(portal().with_captcha(CaptchaScript::Never), config)
}

#[tokio::test]
async fn second_request_in_flight_is_rejected_and_cancel_stops_the_first() {
	let (script, config) = stuck_on_captcha();
	let server = start_with(script, config).await;
	let mut client = connect(&server).await;
	let id = server.patient.id;

	send(&mut client, search(id)).await;
	wait_for_step(&mut client, Step::Captcha).await;

	send(&mut client, search(id)).await;
	match recv(&mut client).await {
		ServerMessage::Error { code, .. } => assert_eq!(code, Some(ErrorCode::RequestInFlight)),
		other => panic!("expected an in-flight error, got {other:?}"),
	}
	send(&mut client, json!({"action": "ping"})).await;
	assert_eq!(recv(&mut client).await, ServerMessage::Pong);

	send(&mut client, json!({"action": "cancel"})).await;
	let events = until_terminal(&mut client).await;
	let ServerMessage::Result { data } = events.last().unwrap() else {
		panic!("expected a cancelled result: {events:?}");
	};
	assert_eq!(data.status, OutcomeStatus::Cancelled);
	match recv(&mut client).await {
		ServerMessage::SessionStatus { data } => {
			assert!(data.active, "cancelled flows keep their session");
			assert!(!data.logged_in);
		}
		other => panic!("expected session status, got {other:?}"),
	}
	assert_eq!(server.factory.opened(), 1);
}

#[tokio::test]
async fn disconnect_cancels_the_running_flow() {
	let (script, config) = stuck_on_captcha();
	let server = start_with(script, config).await;
	let mut client = connect(&server).await;
	let id = server.patient.id;

	send(&mut client, search(id)).await;
	wait_for_step(&mut client, Step::Captcha).await;
	drop(client);

	let sessions = server.state.engine.sessions();
	for _ in 0..200 {
		if let Ok(lease) = sessions.acquire(id).await {
			sessions.release(lease);
			return;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("session was still held after the client disconnected");
}
