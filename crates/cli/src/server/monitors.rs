//! Monitor records and on-demand checks.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use randevu_protocol::{Monitor, MonitorDraft, MonitorPatch};
use serde_json::{Value, json};

use super::AppState;
use crate::error::{CliError, Result};

pub(super) async fn list(State(state): State<AppState>) -> Json<Vec<Monitor>> {
	Json(state.monitors().list())
}

pub(super) async fn create(State(state): State<AppState>, Json(draft): Json<MonitorDraft>) -> Result<(StatusCode, Json<Monitor>)> {
	state.store.require(draft.patient_id)?;
	let monitor = state.monitors().create(draft)?;
	Ok((StatusCode::CREATED, Json(monitor)))
}

/// Pausing a monitor also stops its running check.
pub(super) async fn update(State(state): State<AppState>, Path(id): Path<u64>, Json(patch): Json<MonitorPatch>) -> Result<Json<Monitor>> {
	if patch.is_empty() {
		return Err(CliError::InvalidRequest("update changes nothing".to_string()));
	}
	let monitor = state.monitors().update(id, patch)?;
	if !monitor.is_active {
		state.scheduler.cancel(id);
	}
	Ok(Json(monitor))
}

pub(super) async fn delete(State(state): State<AppState>, Path(id): Path<u64>) -> Result<Json<Value>> {
	let monitor = state.monitors().delete(id)?;
	let cancelled = state.scheduler.cancel(monitor.id);
	Ok(Json(json!({ "deleted": monitor.id, "cancelled": cancelled })))
}

/// Starts a check now instead of waiting for the next sweep.
pub(super) async fn run_now(State(state): State<AppState>, Path(id): Path<u64>) -> Result<(StatusCode, Json<Value>)> {
	let monitor = state.monitors().require(id)?;
	if !monitor.is_active {
		return Err(CliError::InvalidRequest(format!("monitor {id} is paused")));
	}
	let started = state.scheduler.start(id).is_some();
	Ok((StatusCode::ACCEPTED, Json(json!({ "started": started }))))
}
