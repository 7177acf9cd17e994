//! Recurring background checks kept by the record store.

use serde::{Deserialize, Serialize};

use crate::messages::SearchParams;
use crate::outcome::OutcomeStatus;
use crate::patient::PatientId;

/// Interval used when a draft names none.
pub const DEFAULT_INTERVAL_MINUTES: u32 = 10;

/// What a check does once it finds open sub-times.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorAction {
	/// Record and log what was found.
	#[default]
	Notify,
	/// Book the latest sub-time that passes the filters.
	AutoBook,
}

/// A stored search repeated every `interval_minutes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
	pub id: u64,
	pub patient_id: PatientId,
	#[serde(default)]
	pub search_text: String,
	#[serde(default)]
	pub randevu_type: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub date_range: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub time_range: Option<String>,
	pub interval_minutes: u32,
	#[serde(default)]
	pub action_type: MonitorAction,
	#[serde(default = "active_by_default")]
	pub is_active: bool,
	/// Local time the last check started, `YYYY-MM-DDTHH:MM:SS`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_checked: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_status: Option<OutcomeStatus>,
	/// Human-readable summary of the last check.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_message: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created_at: Option<String>,
}

fn active_by_default() -> bool {
	true
}

impl Monitor {
	/// Search criteria for one check.
	pub fn params(&self) -> SearchParams {
		SearchParams {
			patient_id: self.patient_id,
			search_text: self.search_text.clone(),
			randevu_type: self.randevu_type.clone(),
			date_range: self.date_range.clone(),
			time_range: self.time_range.clone(),
		}
	}
}

/// Payload for creating a monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorDraft {
	pub patient_id: PatientId,
	#[serde(default)]
	pub search_text: String,
	#[serde(default)]
	pub randevu_type: String,
	#[serde(default)]
	pub date_range: Option<String>,
	#[serde(default)]
	pub time_range: Option<String>,
	#[serde(default = "default_interval")]
	pub interval_minutes: u32,
	#[serde(default)]
	pub action_type: MonitorAction,
}

fn default_interval() -> u32 {
	DEFAULT_INTERVAL_MINUTES
}

/// Partial update for a monitor; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorPatch {
	#[serde(default)]
	pub search_text: Option<String>,
	#[serde(default)]
	pub randevu_type: Option<String>,
	#[serde(default)]
	pub date_range: Option<String>,
	#[serde(default)]
	pub time_range: Option<String>,
	#[serde(default)]
	pub interval_minutes: Option<u32>,
	#[serde(default)]
	pub action_type: Option<MonitorAction>,
	#[serde(default)]
	pub is_active: Option<bool>,
}

impl MonitorPatch {
	pub fn is_empty(&self) -> bool {
		self.search_text.is_none()
			&& self.randevu_type.is_none()
			&& self.date_range.is_none()
			&& self.time_range.is_none()
			&& self.interval_minutes.is_none()
			&& self.action_type.is_none()
			&& self.is_active.is_none()
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn draft_defaults_to_a_notifying_ten_minute_check() {
		let draft: MonitorDraft = serde_json::from_value(json!({"patient_id": "3", "search_text": "Kardiyoloji"})).unwrap();
		assert_eq!(draft.patient_id, PatientId(3));
		assert_eq!(draft.interval_minutes, DEFAULT_INTERVAL_MINUTES);
		assert_eq!(draft.action_type, MonitorAction::Notify);
	}

	#[test]
	fn action_type_uses_snake_case() {
		assert_eq!(serde_json::to_value(MonitorAction::AutoBook).unwrap(), json!("auto_book"));
		let patch: MonitorPatch = serde_json::from_value(json!({"action_type": "notify"})).unwrap();
		assert_eq!(patch.action_type, Some(MonitorAction::Notify));
		assert!(!patch.is_empty());
		assert!(MonitorPatch::default().is_empty());
	}

	#[test]
	fn stored_monitor_without_flags_is_active() {
		let monitor: Monitor = serde_json::from_value(json!({
			"id": 1,
			"patient_id": 2,
			"interval_minutes": 5,
		}))
		.unwrap();
		assert!(monitor.is_active);
		assert_eq!(monitor.last_checked, None);
		assert_eq!(monitor.params().patient_id, PatientId(2));
	}
}
