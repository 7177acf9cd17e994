//! Search and booking outcome shapes.

use serde::{Deserialize, Serialize};

/// Terminal status of one search/book request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
	Available,
	NotAvailable,
	Error,
	Cancelled,
	Unknown,
}

/// Availability of a single appointment category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CategoryStatus {
	Available,
	NotAvailable,
	Unknown,
}

impl From<CategoryStatus> for OutcomeStatus {
	fn from(status: CategoryStatus) -> Self {
		match status {
			CategoryStatus::Available => OutcomeStatus::Available,
			CategoryStatus::NotAvailable => OutcomeStatus::NotAvailable,
			CategoryStatus::Unknown => OutcomeStatus::Unknown,
		}
	}
}

/// Classification of one listing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
	Available,
	NotAvailable,
	Unknown,
}

/// A discovered appointment opportunity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCandidate {
	pub category: String,
	/// Bucket date, `DD.MM.YYYY` (empty when the listing had no date header).
	pub date: String,
	/// Bucket hour, `HH:MM`.
	pub hour: String,
	/// Fine-grained time when the listing exposes it directly.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub subtime: Option<String>,
	pub state: SlotState,
}

/// Scan result for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryReport {
	pub name: String,
	pub status: CategoryStatus,
	#[serde(default)]
	pub slots: Vec<SlotCandidate>,
	/// Human-readable summary of the available slots.
	#[serde(default)]
	pub formatted: String,
	/// Reason the category could not be scanned, when it could not.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl CategoryReport {
	pub fn available_slots(&self) -> impl Iterator<Item = &SlotCandidate> {
		self.slots.iter().filter(|slot| slot.state == SlotState::Available)
	}
}

/// Sub-times discovered inside one coarse bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbedBucket {
	pub date: String,
	pub hour: String,
	#[serde(default)]
	pub subtimes: Vec<String>,
}

/// Sub-time probe result for one category; ordered as the buckets were probed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
	pub category: String,
	#[serde(default)]
	pub buckets: Vec<ProbedBucket>,
}

/// The exact slot a booking request targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookTarget {
	pub date: String,
	pub hour: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub subtime: Option<String>,
}

impl BookTarget {
	/// The time the booking actually lands on.
	pub fn effective_time(&self) -> &str {
		self.subtime.as_deref().filter(|s| !s.is_empty()).unwrap_or(&self.hour)
	}
}

/// Outcome of one booking attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingResult {
	pub success: bool,
	/// Portal message read back verbatim, or an explanation when none was readable.
	pub message: String,
	pub target: BookTarget,
}

/// Terminal snapshot of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOutcome {
	pub status: OutcomeStatus,
	#[serde(default)]
	pub alternatives: Vec<CategoryReport>,
	#[serde(default)]
	pub probed_subtimes: Vec<ProbeResult>,
	#[serde(default)]
	pub session_reused: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub booking: Option<BookingResult>,
	#[serde(default)]
	pub total_visible: usize,
	#[serde(default)]
	pub total_available: usize,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timestamp: Option<String>,
}

impl SearchOutcome {
	/// Outcome carrying only a status (used for cancellation).
	pub fn bare(status: OutcomeStatus) -> Self {
		Self {
			status,
			alternatives: Vec::new(),
			probed_subtimes: Vec::new(),
			session_reused: false,
			booking: None,
			total_visible: 0,
			total_available: 0,
			timestamp: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn statuses_use_screaming_case_on_the_wire() {
		assert_eq!(serde_json::to_value(OutcomeStatus::NotAvailable).unwrap(), json!("NOT_AVAILABLE"));
		assert_eq!(serde_json::to_value(CategoryStatus::Available).unwrap(), json!("AVAILABLE"));
		assert_eq!(serde_json::to_value(SlotState::NotAvailable).unwrap(), json!("not_available"));
	}

	#[test]
	fn cancelled_outcome_serializes_with_status_only_essentials() {
		let value = serde_json::to_value(SearchOutcome::bare(OutcomeStatus::Cancelled)).unwrap();
		assert_eq!(value["status"], "CANCELLED");
		assert!(value.get("booking").is_none());
		assert_eq!(value["alternatives"], json!([]));
	}

	#[test]
	fn effective_time_falls_back_to_hour() {
		let mut target = BookTarget {
			date: "26.02.2026".into(),
			hour: "16:00".into(),
			subtime: Some("16:10".into()),
		};
		assert_eq!(target.effective_time(), "16:10");
		target.subtime = Some(String::new());
		assert_eq!(target.effective_time(), "16:00");
	}
}
