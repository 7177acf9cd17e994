use std::path::PathBuf;
use std::time::Duration;

use randevu_protocol::ErrorCode;
use thiserror::Error;

/// Failures surfaced by the engine.
///
/// Category-local failures ([`EngineError::CategoryScanFailure`]) and
/// unreadable booking confirmations ([`EngineError::BookingUnconfirmed`]) are
/// recorded in the outcome instead of ending the request; every other variant
/// produces an `error` terminal event.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("required field not found: {0}")]
	FormFieldNotFound(String),

	#[error("CAPTCHA not completed: {0}")]
	CaptchaTimeout(String),

	#[error("navigation to {url} failed: {reason}")]
	NavigationFailure { url: String, reason: String },

	#[error("scanning category '{category}' failed: {reason}")]
	CategoryScanFailure { category: String, reason: String },

	#[error("booking result unconfirmed: {0}")]
	BookingUnconfirmed(String),

	#[error("session for patient {0} is busy with another request")]
	SessionBusy(String),

	#[error("portal rejected login: {0}")]
	LoginRejected(String),

	#[error("invalid patient record: {0}")]
	InvalidPatient(String),

	#[error("timed out after {ms}ms waiting for {what}")]
	Timeout { what: String, ms: u64 },

	#[error("browser driver error: {0}")]
	Driver(String),

	#[error("request cancelled")]
	Cancelled,

	#[error("failed to write {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl EngineError {
	pub fn code(&self) -> ErrorCode {
		match self {
			EngineError::FormFieldNotFound(_) => ErrorCode::FormFieldNotFound,
			EngineError::CaptchaTimeout(_) => ErrorCode::CaptchaTimeout,
			EngineError::NavigationFailure { .. } | EngineError::Driver(_) => ErrorCode::NavigationFailure,
			EngineError::CategoryScanFailure { .. } => ErrorCode::CategoryScanFailure,
			EngineError::BookingUnconfirmed(_) => ErrorCode::BookingUnconfirmed,
			EngineError::SessionBusy(_) => ErrorCode::SessionBusy,
			EngineError::LoginRejected(_) => ErrorCode::LoginRejected,
			EngineError::InvalidPatient(_) => ErrorCode::InvalidRequest,
			EngineError::Timeout { .. } => ErrorCode::Timeout,
			EngineError::Cancelled | EngineError::Io { .. } | EngineError::Json(_) => ErrorCode::Internal,
		}
	}

	/// Whether the session that produced this error must be destroyed rather
	/// than released for reuse.
	pub fn discards_session(&self) -> bool {
		matches!(self, EngineError::NavigationFailure { .. } | EngineError::Driver(_))
	}

	pub(crate) fn timeout(what: impl Into<String>, after: Duration) -> Self {
		EngineError::Timeout {
			what: what.into(),
			ms: after.as_millis() as u64,
		}
	}
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn navigation_and_driver_failures_discard_the_session() {
		let nav = EngineError::NavigationFailure {
			url: "https://portal.test".into(),
			reason: "net::ERR_CONNECTION_RESET".into(),
		};
		assert!(nav.discards_session());
		assert!(EngineError::Driver("target closed".into()).discards_session());
		assert!(!EngineError::CaptchaTimeout("no human available".into()).discards_session());
		assert!(!EngineError::LoginRejected("hatalı".into()).discards_session());
	}

	#[test]
	fn codes_follow_the_taxonomy() {
		assert_eq!(EngineError::FormFieldNotFound("consent".into()).code(), ErrorCode::FormFieldNotFound);
		assert_eq!(EngineError::SessionBusy("7".into()).code(), ErrorCode::SessionBusy);
		assert_eq!(EngineError::timeout("grid", Duration::from_millis(1500)).code(), ErrorCode::Timeout);
	}

	#[test]
	fn timeout_reports_milliseconds() {
		let err = EngineError::timeout("appointment listing", Duration::from_millis(1500));
		assert_eq!(err.to_string(), "timed out after 1500ms waiting for appointment listing");
	}
}
