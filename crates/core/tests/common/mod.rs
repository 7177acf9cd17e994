#![allow(dead_code)]

use std::sync::Arc;

use randevu::page::fake::{Action, PortalScript, ScriptedFactory};
use randevu::{Engine, EngineConfig, Reporter, Request};
use randevu_protocol::{BookTarget, ErrorCode, Patient, PatientId, SearchOutcome, SearchParams, ServerMessage, Step};

pub const PATIENT: PatientId = PatientId(7);

pub fn patient() -> Patient {
	Patient {
		id: PATIENT,
		name: "Ayşe Yılmaz".to_string(),
		identity_number: "10000000146".to_string(),
		birth_date: "05.03.1990".to_string(),
		phone: Some("5551234567".to_string()),
		created_at: None,
	}
}

pub fn params(category: &str) -> SearchParams {
	SearchParams {
		patient_id: PATIENT,
		search_text: String::new(),
		randevu_type: category.to_string(),
		date_range: None,
		time_range: None,
	}
}

pub fn search(category: &str) -> Request {
	Request::Search(params(category))
}

pub fn book(category: &str, date: &str, hour: &str, subtime: Option<&str>) -> Request {
	Request::Book {
		params: params(category),
		target: BookTarget {
			date: date.to_string(),
			hour: hour.to_string(),
			subtime: subtime.map(str::to_string),
		},
	}
}

pub fn engine(script: PortalScript) -> (Engine, Arc<ScriptedFactory>) {
	engine_with(script, EngineConfig::for_tests())
}

pub fn engine_with(script: PortalScript, config: EngineConfig) -> (Engine, Arc<ScriptedFactory>) {
	let factory = Arc::new(ScriptedFactory::new(script));
	(Engine::new(config, factory.clone()), factory)
}

/// Runs `request` and returns every message the reporter received.
pub async fn run(engine: &Engine, request: Request) -> Vec<ServerMessage> {
	let (reporter, rx) = Reporter::channel();
	run_with(engine, request, reporter, rx).await
}

pub async fn run_with(
	engine: &Engine,
	request: Request,
	reporter: Reporter,
	mut rx: tokio::sync::mpsc::UnboundedReceiver<ServerMessage>,
) -> Vec<ServerMessage> {
	let returned = engine.run(&patient(), request, reporter).await;
	let mut events = Vec::new();
	while let Some(message) = rx.recv().await {
		events.push(message);
	}
	assert_eq!(events.iter().filter(|m| m.is_terminal()).count(), 1, "exactly one terminal event: {events:?}");
	assert_eq!(events.last(), Some(&returned), "terminal event comes last");
	events
}

pub fn outcome(events: &[ServerMessage]) -> &SearchOutcome {
	match events.last() {
		Some(ServerMessage::Result { data }) => data,
		other => panic!("expected a result, got {other:?}"),
	}
}

pub fn error(events: &[ServerMessage]) -> (Option<ErrorCode>, &str) {
	match events.last() {
		Some(ServerMessage::Error { code, message }) => (*code, message.as_str()),
		other => panic!("expected an error, got {other:?}"),
	}
}

pub fn steps(events: &[ServerMessage]) -> Vec<Step> {
	events
		.iter()
		.filter_map(|m| match m {
			ServerMessage::Status { step, .. } => Some(*step),
			_ => None,
		})
		.collect()
}

pub fn messages(events: &[ServerMessage]) -> Vec<&str> {
	events
		.iter()
		.filter_map(|m| match m {
			ServerMessage::Status { message, .. } => Some(message.as_str()),
			_ => None,
		})
		.collect()
}

pub fn clicked(journal: &[Action], key: &str) -> bool {
	journal.iter().any(|a| matches!(a, Action::Click(k) if k == key))
}

pub fn chosen_categories(journal: &[Action]) -> Vec<String> {
	journal
		.iter()
		.filter_map(|a| match a {
			Action::Choose { field, item } if field == "category" => Some(item.clone()),
			_ => None,
		})
		.collect()
}
