use std::path::PathBuf;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use randevu::EngineError;
use randevu_protocol::{ErrorCode, PatientId};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("patient {0} not found")]
	PatientNotFound(PatientId),

	#[error("{0} not found")]
	NotFound(String),

	#[error("invalid request: {0}")]
	InvalidRequest(String),

	#[error(transparent)]
	Engine(#[from] EngineError),

	#[error("failed to access {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;

impl CliError {
	pub fn code(&self) -> ErrorCode {
		match self {
			CliError::PatientNotFound(_) => ErrorCode::PatientNotFound,
			CliError::NotFound(_) => ErrorCode::NotFound,
			CliError::InvalidRequest(_) => ErrorCode::InvalidRequest,
			CliError::Engine(err) => err.code(),
			CliError::Io { .. } | CliError::Json(_) | CliError::Anyhow(_) => ErrorCode::Internal,
		}
	}

	pub fn status(&self) -> StatusCode {
		match self.code() {
			ErrorCode::PatientNotFound | ErrorCode::NotFound => StatusCode::NOT_FOUND,
			ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
			ErrorCode::SessionBusy | ErrorCode::RequestInFlight => StatusCode::CONFLICT,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl IntoResponse for CliError {
	fn into_response(self) -> Response {
		let body = json!({
			"error": {
				"code": self.code(),
				"message": self.to_string(),
			}
		});
		(self.status(), Json(body)).into_response()
	}
}
