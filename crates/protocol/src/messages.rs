//! Messages exchanged over the persistent client connection.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::outcome::{BookTarget, SearchOutcome};
use crate::patient::PatientId;

/// Criteria shared by `search` and `book` requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
	pub patient_id: PatientId,
	/// Free-text unit/doctor hint typed into the portal's search field.
	#[serde(default)]
	pub search_text: String,
	/// Appointment category to select; empty keeps the portal default.
	#[serde(default)]
	pub randevu_type: String,
	/// Optional date filter for reported sub-times (`bugun`, `DD.MM.YYYY`, `DD.MM.YYYY-DD.MM.YYYY`).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub date_range: Option<String>,
	/// Optional time filter for reported sub-times (`HH:MM-HH:MM`, `HH:MM-`, `-HH:MM`).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub time_range: Option<String>,
}

/// Client → server messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
	Search(SearchParams),
	Book {
		#[serde(flatten)]
		params: SearchParams,
		book_target: BookTarget,
	},
	Cancel,
	Ping,
	SessionStatus {
		patient_id: PatientId,
	},
	CloseSession {
		patient_id: PatientId,
	},
}

/// Named transitions reported through `status` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
	Init,
	Session,
	LoginStart,
	FillIdentity,
	FillBirthDate,
	Consent,
	Captcha,
	Submit,
	InfoDialog,
	LoggedIn,
	Search,
	SelectCategory,
	Scanning,
	Classify,
	Probe,
	Book,
}

impl Step {
	pub fn as_str(self) -> &'static str {
		match self {
			Step::Init => "init",
			Step::Session => "session",
			Step::LoginStart => "login_start",
			Step::FillIdentity => "fill_identity",
			Step::FillBirthDate => "fill_birth_date",
			Step::Consent => "consent",
			Step::Captcha => "captcha",
			Step::Submit => "submit",
			Step::InfoDialog => "info_dialog",
			Step::LoggedIn => "logged_in",
			Step::Search => "search",
			Step::SelectCategory => "select_category",
			Step::Scanning => "scanning",
			Step::Classify => "classify",
			Step::Probe => "probe",
			Step::Book => "book",
		}
	}

	/// Steps that only occur while logging in.
	pub fn is_login(self) -> bool {
		matches!(
			self,
			Step::LoginStart
				| Step::FillIdentity | Step::FillBirthDate
				| Step::Consent | Step::Captcha
				| Step::Submit | Step::InfoDialog
				| Step::LoggedIn
		)
	}
}

impl fmt::Display for Step {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Standardized error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	FormFieldNotFound,
	CaptchaTimeout,
	NavigationFailure,
	CategoryScanFailure,
	BookingUnconfirmed,
	SessionBusy,
	LoginRejected,
	InvalidRequest,
	PatientNotFound,
	NotFound,
	RequestInFlight,
	Timeout,
	Internal,
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ErrorCode::FormFieldNotFound => "FORM_FIELD_NOT_FOUND",
			ErrorCode::CaptchaTimeout => "CAPTCHA_TIMEOUT",
			ErrorCode::NavigationFailure => "NAVIGATION_FAILURE",
			ErrorCode::CategoryScanFailure => "CATEGORY_SCAN_FAILURE",
			ErrorCode::BookingUnconfirmed => "BOOKING_UNCONFIRMED",
			ErrorCode::SessionBusy => "SESSION_BUSY",
			ErrorCode::LoginRejected => "LOGIN_REJECTED",
			ErrorCode::InvalidRequest => "INVALID_REQUEST",
			ErrorCode::PatientNotFound => "PATIENT_NOT_FOUND",
			ErrorCode::NotFound => "NOT_FOUND",
			ErrorCode::RequestInFlight => "REQUEST_IN_FLIGHT",
			ErrorCode::Timeout => "TIMEOUT",
			ErrorCode::Internal => "INTERNAL",
		};
		f.write_str(name)
	}
}

/// Liveness snapshot of a patient's browsing session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
	pub active: bool,
	pub logged_in: bool,
	#[serde(default)]
	pub idle_seconds: u64,
}

/// Server → client messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
	Status {
		step: Step,
		message: String,
	},
	Result {
		data: Box<SearchOutcome>,
	},
	Error {
		message: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		code: Option<ErrorCode>,
	},
	SessionStatus {
		data: SessionStatus,
	},
	Pong,
	SessionClosed {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		patient_id: Option<PatientId>,
	},
}

impl ServerMessage {
	pub fn status(step: Step, message: impl Into<String>) -> Self {
		ServerMessage::Status {
			step,
			message: message.into(),
		}
	}

	pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
		ServerMessage::Error {
			message: message.into(),
			code: Some(code),
		}
	}

	/// `result` and `error` end a request; everything else is intermediate.
	pub fn is_terminal(&self) -> bool {
		matches!(self, ServerMessage::Result { .. } | ServerMessage::Error { .. })
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::outcome::{OutcomeStatus, SearchOutcome};

	#[test]
	fn search_request_parses_with_defaults() {
		let msg: ClientMessage = serde_json::from_value(json!({
			"action": "search",
			"patient_id": 7,
			"randevu_type": "Kardiyoloji"
		}))
		.unwrap();
		let ClientMessage::Search(params) = msg else {
			panic!("expected search");
		};
		assert_eq!(params.patient_id, PatientId(7));
		assert_eq!(params.randevu_type, "Kardiyoloji");
		assert!(params.search_text.is_empty());
		assert!(params.date_range.is_none());
	}

	#[test]
	fn book_request_carries_flattened_criteria_and_target() {
		let msg: ClientMessage = serde_json::from_value(json!({
			"action": "book",
			"patient_id": "3",
			"search_text": "kardiyoloji",
			"randevu_type": "Kardiyoloji",
			"book_target": {"date": "26.02.2026", "hour": "16:00", "subtime": "16:10"}
		}))
		.unwrap();
		match msg {
			ClientMessage::Book { params, book_target } => {
				assert_eq!(params.patient_id, PatientId(3));
				assert_eq!(book_target.subtime.as_deref(), Some("16:10"));
			}
			other => panic!("unexpected {other:?}"),
		}
	}

	#[test]
	fn cancel_and_ping_are_bare_actions() {
		assert_eq!(serde_json::from_value::<ClientMessage>(json!({"action": "cancel"})).unwrap(), ClientMessage::Cancel);
		assert_eq!(serde_json::from_value::<ClientMessage>(json!({"action": "ping"})).unwrap(), ClientMessage::Ping);
		assert!(serde_json::from_value::<ClientMessage>(json!({"action": "dance"})).is_err());
	}

	#[test]
	fn server_messages_match_channel_shapes() {
		assert_eq!(
			serde_json::to_value(ServerMessage::status(Step::SelectCategory, "Kardiyoloji")).unwrap(),
			json!({"type": "status", "step": "select_category", "message": "Kardiyoloji"})
		);
		assert_eq!(serde_json::to_value(ServerMessage::Pong).unwrap(), json!({"type": "pong"}));
		assert_eq!(
			serde_json::to_value(ServerMessage::SessionClosed { patient_id: None }).unwrap(),
			json!({"type": "session_closed"})
		);

		let result = ServerMessage::Result {
			data: Box::new(SearchOutcome::bare(OutcomeStatus::Cancelled)),
		};
		let value = serde_json::to_value(&result).unwrap();
		assert_eq!(value["type"], "result");
		assert_eq!(value["data"]["status"], "CANCELLED");
		assert!(result.is_terminal());
	}

	#[test]
	fn step_names_match_serde_names() {
		for step in [Step::LoginStart, Step::FillBirthDate, Step::SelectCategory, Step::Probe] {
			assert_eq!(serde_json::to_value(step).unwrap(), json!(step.as_str()));
		}
		assert!(Step::Captcha.is_login());
		assert!(!Step::Scanning.is_login());
	}
}
