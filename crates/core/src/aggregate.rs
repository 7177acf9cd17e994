//! Assembly of the terminal [`SearchOutcome`].

use chrono::Local;
use randevu_protocol::{BookingResult, CategoryReport, CategoryStatus, OutcomeStatus, ProbeResult, SearchOutcome};

/// `AVAILABLE` if any category is, `NOT_AVAILABLE` only if every scanned
/// category is, `UNKNOWN` otherwise (including when nothing was scanned).
pub fn overall_status(reports: &[CategoryReport]) -> OutcomeStatus {
	if reports.iter().any(|r| r.status == CategoryStatus::Available) {
		OutcomeStatus::Available
	} else if !reports.is_empty() && reports.iter().all(|r| r.status == CategoryStatus::NotAvailable) {
		OutcomeStatus::NotAvailable
	} else {
		OutcomeStatus::Unknown
	}
}

/// Everything one flow produced, collected before the terminal event.
#[derive(Debug, Default)]
pub struct Findings {
	pub reports: Vec<CategoryReport>,
	pub probes: Vec<ProbeResult>,
	pub booking: Option<BookingResult>,
	pub session_reused: bool,
}

impl Findings {
	pub fn into_outcome(self) -> SearchOutcome {
		let total_visible = self.reports.iter().map(|r| r.slots.len()).sum();
		let total_available = self.reports.iter().map(|r| r.available_slots().count()).sum();
		SearchOutcome {
			status: overall_status(&self.reports),
			total_visible,
			total_available,
			alternatives: self.reports,
			probed_subtimes: self.probes,
			session_reused: self.session_reused,
			booking: self.booking,
			timestamp: Some(timestamp()),
		}
	}
}

/// Outcome of a flow abandoned on request.
pub fn cancelled(session_reused: bool) -> SearchOutcome {
	SearchOutcome {
		session_reused,
		timestamp: Some(timestamp()),
		..SearchOutcome::bare(OutcomeStatus::Cancelled)
	}
}

fn timestamp() -> String {
	Local::now().format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}
