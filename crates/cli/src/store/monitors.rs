use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use randevu_protocol::{Monitor, MonitorDraft, MonitorPatch, OutcomeStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{SCHEMA_VERSION, read_to_string, timestamp_now, write_atomically};
use crate::error::{CliError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MonitorFile {
	schema: u32,
	#[serde(default)]
	next_id: u64,
	#[serde(default)]
	monitors: Vec<Monitor>,
}

impl Default for MonitorFile {
	fn default() -> Self {
		Self {
			schema: SCHEMA_VERSION,
			next_id: 1,
			monitors: Vec::new(),
		}
	}
}

/// Recurring checks kept in one JSON file, rewritten on every mutation.
#[derive(Debug)]
pub struct MonitorStore {
	path: PathBuf,
	state: RwLock<MonitorFile>,
}

impl MonitorStore {
	/// Loads `path`, starting empty when the file does not exist yet.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
		let path = path.into();
		let state = if path.exists() {
			let mut file: MonitorFile = serde_json::from_str(&read_to_string(&path)?)?;
			if file.schema != SCHEMA_VERSION {
				warn!(target = "randevu.store", found = file.schema, expected = SCHEMA_VERSION, "unexpected monitor store schema");
			}
			let highest = file.monitors.iter().map(|m| m.id).max().unwrap_or(0);
			file.next_id = file.next_id.max(highest + 1);
			file
		} else {
			MonitorFile::default()
		};
		info!(target = "randevu.store", path = %path.display(), monitors = state.monitors.len(), "monitor store loaded");
		Ok(Self {
			path,
			state: RwLock::new(state),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn list(&self) -> Vec<Monitor> {
		self.state.read().monitors.clone()
	}

	/// Monitors the scheduler should consider.
	pub fn active(&self) -> Vec<Monitor> {
		self.state.read().monitors.iter().filter(|m| m.is_active).cloned().collect()
	}

	pub fn get(&self, id: u64) -> Option<Monitor> {
		self.state.read().monitors.iter().find(|m| m.id == id).cloned()
	}

	pub fn require(&self, id: u64) -> Result<Monitor> {
		self.get(id).ok_or_else(|| not_found(id))
	}

	/// Stores a new active monitor. The caller vouches that the patient exists.
	pub fn create(&self, draft: MonitorDraft) -> Result<Monitor> {
		let mut state = self.state.write();
		let monitor = Monitor {
			id: state.next_id,
			patient_id: draft.patient_id,
			search_text: draft.search_text.trim().to_string(),
			randevu_type: draft.randevu_type.trim().to_string(),
			date_range: normalize_filter(draft.date_range),
			time_range: normalize_filter(draft.time_range),
			interval_minutes: draft.interval_minutes,
			action_type: draft.action_type,
			is_active: true,
			last_checked: None,
			last_status: None,
			last_message: None,
			created_at: Some(timestamp_now()),
		};
		validate(&monitor)?;

		let mut next = state.clone();
		next.monitors.push(monitor.clone());
		next.next_id += 1;
		self.persist(&next)?;
		*state = next;
		info!(
			target = "randevu.store",
			monitor = monitor.id,
			patient = %monitor.patient_id,
			action = ?monitor.action_type,
			every_minutes = monitor.interval_minutes,
			"monitor created"
		);
		Ok(monitor)
	}

	pub fn update(&self, id: u64, patch: MonitorPatch) -> Result<Monitor> {
		let monitor = self.modify(id, |monitor| {
			if let Some(text) = patch.search_text {
				monitor.search_text = text.trim().to_string();
			}
			if let Some(kind) = patch.randevu_type {
				monitor.randevu_type = kind.trim().to_string();
			}
			if patch.date_range.is_some() {
				monitor.date_range = normalize_filter(patch.date_range);
			}
			if patch.time_range.is_some() {
				monitor.time_range = normalize_filter(patch.time_range);
			}
			if let Some(minutes) = patch.interval_minutes {
				monitor.interval_minutes = minutes;
			}
			if let Some(action) = patch.action_type {
				monitor.action_type = action;
			}
			if let Some(active) = patch.is_active {
				monitor.is_active = active;
			}
			validate(monitor)
		})?;
		info!(target = "randevu.store", monitor = id, active = monitor.is_active, "monitor updated");
		Ok(monitor)
	}

	pub fn delete(&self, id: u64) -> Result<Monitor> {
		let mut state = self.state.write();
		let index = state.monitors.iter().position(|m| m.id == id).ok_or_else(|| not_found(id))?;
		let mut next = state.clone();
		let removed = next.monitors.remove(index);
		self.persist(&next)?;
		*state = next;
		info!(target = "randevu.store", monitor = id, "monitor deleted");
		Ok(removed)
	}

	/// Stamps the start of a check so the next sweep does not pick it up again.
	pub fn mark_checked(&self, id: u64) -> Result<Monitor> {
		self.modify(id, |monitor| {
			monitor.last_checked = Some(timestamp_now());
			Ok(())
		})
	}

	/// Records how a check ended; `deactivate` stops further checks.
	pub fn record(&self, id: u64, status: OutcomeStatus, message: impl Into<String>, deactivate: bool) -> Result<Monitor> {
		let message = message.into();
		self.modify(id, |monitor| {
			monitor.last_checked = Some(timestamp_now());
			monitor.last_status = Some(status);
			monitor.last_message = Some(message);
			if deactivate {
				monitor.is_active = false;
			}
			Ok(())
		})
	}

	fn modify(&self, id: u64, change: impl FnOnce(&mut Monitor) -> Result<()>) -> Result<Monitor> {
		let mut state = self.state.write();
		let index = state.monitors.iter().position(|m| m.id == id).ok_or_else(|| not_found(id))?;
		let mut monitor = state.monitors[index].clone();
		change(&mut monitor)?;

		let mut next = state.clone();
		next.monitors[index] = monitor.clone();
		self.persist(&next)?;
		*state = next;
		Ok(monitor)
	}

	fn persist(&self, file: &MonitorFile) -> Result<()> {
		write_atomically(&self.path, file)?;
		debug!(target = "randevu.store", path = %self.path.display(), monitors = file.monitors.len(), "monitor store saved");
		Ok(())
	}
}

fn not_found(id: u64) -> CliError {
	CliError::NotFound(format!("monitor {id}"))
}

fn normalize_filter(filter: Option<String>) -> Option<String> {
	filter.map(|f| f.trim().to_string()).filter(|f| !f.is_empty())
}

fn validate(monitor: &Monitor) -> Result<()> {
	if monitor.interval_minutes == 0 {
		return Err(CliError::InvalidRequest("interval_minutes must be at least 1".to_string()));
	}
	if monitor.search_text.is_empty() && monitor.randevu_type.is_empty() {
		return Err(CliError::InvalidRequest("search_text or randevu_type is required".to_string()));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::fs;

	use randevu_protocol::{ErrorCode, MonitorAction, PatientId};
	use tempfile::TempDir;

	use super::*;

	fn draft() -> MonitorDraft {
		MonitorDraft {
			patient_id: PatientId(1),
			search_text: " Kardiyoloji ".into(),
			randevu_type: String::new(),
			date_range: Some("  ".into()),
			time_range: Some("09:00-12:00".into()),
			interval_minutes: 15,
			action_type: MonitorAction::AutoBook,
		}
	}

	fn store(dir: &TempDir) -> MonitorStore {
		MonitorStore::open(dir.path().join("data").join("monitors.json")).expect("store should open")
	}

	#[test]
	fn create_normalizes_and_persists() {
		let dir = TempDir::new().unwrap();
		let created = store(&dir).create(draft()).expect("create should succeed");
		assert_eq!(created.id, 1);
		assert_eq!(created.search_text, "Kardiyoloji");
		assert_eq!(created.date_range, None);
		assert!(created.is_active);
		assert!(created.created_at.is_some());

		let reopened = store(&dir);
		assert_eq!(reopened.list(), vec![created]);
		assert_eq!(reopened.create(draft()).unwrap().id, 2);
		let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(reopened.path()).unwrap()).unwrap();
		assert_eq!(raw["next_id"], 3);
		assert_eq!(raw["monitors"][0]["action_type"], "auto_book");
	}

	#[test]
	fn invalid_monitors_are_rejected() {
		let dir = TempDir::new().unwrap();
		let store = store(&dir);
		let err = store
			.create(MonitorDraft {
				interval_minutes: 0,
				..draft()
			})
			.unwrap_err();
		assert_eq!(err.code(), ErrorCode::InvalidRequest);
		let err = store
			.create(MonitorDraft {
				search_text: " ".into(),
				..draft()
			})
			.unwrap_err();
		assert!(err.to_string().contains("search_text"), "{err}");
		assert!(store.list().is_empty());
		assert!(!store.path().exists());
	}

	#[test]
	fn update_pauses_and_clears_filters() {
		let dir = TempDir::new().unwrap();
		let store = store(&dir);
		let monitor = store.create(draft()).unwrap();
		let updated = store
			.update(
				monitor.id,
				MonitorPatch {
					time_range: Some(String::new()),
					is_active: Some(false),
					..MonitorPatch::default()
				},
			)
			.unwrap();
		assert_eq!(updated.time_range, None);
		assert!(!updated.is_active);
		assert!(store.active().is_empty());

		let err = store
			.update(
				monitor.id,
				MonitorPatch {
					interval_minutes: Some(0),
					..MonitorPatch::default()
				},
			)
			.unwrap_err();
		assert_eq!(err.code(), ErrorCode::InvalidRequest);
		assert_eq!(store.require(monitor.id).unwrap().interval_minutes, 15);
	}

	#[test]
	fn record_keeps_the_outcome_and_may_deactivate() {
		let dir = TempDir::new().unwrap();
		let store = store(&dir);
		let monitor = store.create(draft()).unwrap();
		assert!(store.mark_checked(monitor.id).unwrap().last_checked.is_some());

		let recorded = store.record(monitor.id, OutcomeStatus::Available, "booked 27.02.2026 09:40", true).unwrap();
		assert_eq!(recorded.last_status, Some(OutcomeStatus::Available));
		assert_eq!(recorded.last_message.as_deref(), Some("booked 27.02.2026 09:40"));
		assert!(!recorded.is_active);
		assert_eq!(self::store(&dir).require(monitor.id).unwrap(), recorded);
	}

	#[test]
	fn unknown_monitor_is_not_found() {
		let dir = TempDir::new().unwrap();
		let store = store(&dir);
		assert_eq!(store.delete(9).unwrap_err().code(), ErrorCode::NotFound);
		assert_eq!(store.mark_checked(9).unwrap_err().code(), ErrorCode::NotFound);
		store.create(draft()).unwrap();
		assert_eq!(store.delete(1).unwrap().id, 1);
		assert!(store.list().is_empty());
	}
}
