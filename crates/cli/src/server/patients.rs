//! Patient records and per-patient session endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use randevu_protocol::{Patient, PatientDraft, PatientId, PatientPatch, SessionStatus};
use serde_json::{Value, json};
use tracing::warn;

use super::AppState;
use crate::error::{CliError, Result};

pub(super) async fn list(State(state): State<AppState>) -> Json<Vec<Patient>> {
	Json(state.store.list())
}

pub(super) async fn create(State(state): State<AppState>, Json(draft): Json<PatientDraft>) -> Result<(StatusCode, Json<Patient>)> {
	let patient = state.store.create(draft)?;
	Ok((StatusCode::CREATED, Json(patient)))
}

pub(super) async fn update(State(state): State<AppState>, Path(id): Path<u64>, Json(patch): Json<PatientPatch>) -> Result<Json<Patient>> {
	if patch.is_empty() {
		return Err(CliError::InvalidRequest("update changes nothing".to_string()));
	}
	Ok(Json(state.store.update(PatientId(id), patch)?))
}

/// Removes the record and closes the patient's session if it is idle.
pub(super) async fn delete(State(state): State<AppState>, Path(id): Path<u64>) -> Result<Json<Value>> {
	let patient = state.store.delete(PatientId(id))?;
	if let Err(err) = state.engine.sessions().close(patient.id).await {
		warn!(target = "randevu.server", patient = %patient.id, error = %err, "session of deleted patient left open");
	}
	Ok(Json(json!({ "deleted": patient.id })))
}

pub(super) async fn session_status(State(state): State<AppState>, Path(patient_id): Path<u64>) -> Json<SessionStatus> {
	Json(state.engine.sessions().status(PatientId(patient_id)))
}

pub(super) async fn close_session(State(state): State<AppState>, Path(patient_id): Path<u64>) -> Result<Json<Value>> {
	let closed = state.engine.sessions().close(PatientId(patient_id)).await?;
	Ok(Json(json!({ "closed": closed })))
}
