//! Listing classification and slot summaries.

use randevu_protocol::{CategoryReport, CategoryStatus, SlotCandidate, SlotState};

use crate::page::GridCell;
use crate::portal;

/// Classifies one category's listing.
///
/// `AVAILABLE` needs at least one open cell; `NOT_AVAILABLE` needs every
/// cell explicitly closed or full, or, with no cells at all, one of the
/// portal's explicit "no appointment" phrases in `page_text`. Anything else
/// is `UNKNOWN` and is never promoted.
pub fn classify(category: &str, cells: &[GridCell], page_text: &str) -> CategoryReport {
	let slots: Vec<SlotCandidate> = cells.iter().map(|cell| slot(category, cell)).collect();
	let status = if slots.iter().any(|s| s.state == SlotState::Available) {
		CategoryStatus::Available
	} else if !slots.is_empty() && slots.iter().all(|s| s.state == SlotState::NotAvailable) {
		CategoryStatus::NotAvailable
	} else if slots.is_empty() && portal::is_negative_listing(page_text) {
		CategoryStatus::NotAvailable
	} else {
		CategoryStatus::Unknown
	};

	let available: Vec<&SlotCandidate> = slots.iter().filter(|s| s.state == SlotState::Available).collect();
	CategoryReport {
		name: category.to_string(),
		status,
		formatted: format_slots(&available),
		slots,
		error: None,
	}
}

/// Report for a category that could not be scanned.
pub fn unscannable(category: &str, reason: impl Into<String>) -> CategoryReport {
	CategoryReport {
		name: category.to_string(),
		status: CategoryStatus::Unknown,
		slots: Vec::new(),
		formatted: String::new(),
		error: Some(reason.into()),
	}
}

fn slot(category: &str, cell: &GridCell) -> SlotCandidate {
	let (hour, subtime) = if cell.is_coarse() {
		(cell.time.clone(), None)
	} else {
		let hh = cell.time.split(':').next().unwrap_or_default();
		(format!("{hh}:00"), Some(cell.time.clone()))
	};
	SlotCandidate {
		category: category.to_string(),
		date: cell.date.clone(),
		hour,
		subtime,
		state: cell.state.slot_state(),
	}
}

/// `"15.03.2026: 10:30, 12:00 | 16.03.2026: 09:00"`, dates in first-seen order.
pub fn format_slots(slots: &[&SlotCandidate]) -> String {
	let mut by_date: Vec<(&str, Vec<&str>)> = Vec::new();
	for slot in slots {
		let date = if slot.date.is_empty() { "?" } else { slot.date.as_str() };
		let time = slot.subtime.as_deref().unwrap_or(&slot.hour);
		match by_date.iter_mut().find(|(d, _)| *d == date) {
			Some((_, times)) => times.push(time),
			None => by_date.push((date, vec![time])),
		}
	}
	by_date
		.into_iter()
		.map(|(date, times)| format!("{date}: {}", times.join(", ")))
		.collect::<Vec<_>>()
		.join(" | ")
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::page::CellState;

	#[test]
	fn one_open_cell_makes_the_category_available() {
		let cells = [
			GridCell::new("15.03.2026", "10:00", CellState::Full),
			GridCell::new("15.03.2026", "11:00", CellState::Open),
		];
		let report = classify("Kardiyoloji", &cells, "");
		assert_eq!(report.status, CategoryStatus::Available);
		assert_eq!(report.available_slots().count(), 1);
		assert_eq!(report.formatted, "15.03.2026: 11:00");
	}

	#[test]
	fn all_disabled_cells_are_not_available() {
		let cells = [
			GridCell::new("15.03.2026", "10:00", CellState::Full),
			GridCell::new("15.03.2026", "11:00", CellState::CapacityFull),
			GridCell::new("16.03.2026", "09:00", CellState::Closed),
		];
		assert_eq!(classify("Kardiyoloji", &cells, "").status, CategoryStatus::NotAvailable);
	}

	#[test]
	fn unrecognized_cells_stay_unknown() {
		let cells = [
			GridCell::new("15.03.2026", "10:00", CellState::Full),
			GridCell::new("15.03.2026", "11:00", CellState::Other),
		];
		assert_eq!(classify("Kardiyoloji", &cells, "").status, CategoryStatus::Unknown);
	}

	#[test]
	fn empty_listing_uses_negative_phrases_only() {
		assert_eq!(classify("X", &[], "Uygun randevu bulunamadı").status, CategoryStatus::NotAvailable);
		assert_eq!(classify("X", &[], "Müsait randevu saatleri").status, CategoryStatus::Unknown);
		assert_eq!(classify("X", &[], "").status, CategoryStatus::Unknown);
	}

	#[test]
	fn fine_grained_cells_carry_their_subtime() {
		let cells = [GridCell::new("26.02.2026", "16:10", CellState::Open)];
		let report = classify("Kardiyoloji", &cells, "");
		let slot = &report.slots[0];
		assert_eq!(slot.hour, "16:00");
		assert_eq!(slot.subtime.as_deref(), Some("16:10"));
	}

	#[test]
	fn summary_groups_by_date() {
		let cells = [
			GridCell::new("15.03.2026", "10:30", CellState::Open),
			GridCell::new("15.03.2026", "12:00", CellState::Open),
			GridCell::new("16.03.2026", "09:00", CellState::Open),
		];
		let report = classify("Kardiyoloji", &cells, "");
		assert_eq!(report.formatted, "15.03.2026: 10:30, 12:00 | 16.03.2026: 09:00");
	}
}
