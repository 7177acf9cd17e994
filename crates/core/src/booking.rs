//! Booking one previously discovered slot.

use randevu_protocol::{BookTarget, BookingResult, CategoryReport, ProbeResult, Step};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::filter::SlotFilter;
use crate::locator::Locator;
use crate::portal;
use crate::probe::normalize_time;
use crate::progress::Reporter;
use crate::search;

/// Where a booking target was discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
	pub category: String,
	pub date: String,
	/// Time label of the listing cell to open.
	pub cell: String,
	/// Entry to pick inside the opened bucket, if the cell is coarse.
	pub subtime: Option<String>,
}

/// Finds `target` among this flow's probes and listing slots.
///
/// Only fine-grained slots are bookable: a probed sub-time inside its
/// bucket, or a listing cell that already shows a minute-level time. A
/// target without a sub-time is matched by its hour against fine cells only,
/// so a coarse bucket is never confirmed without one of its entries picked.
/// Slots outside `filter` are not bookable.
pub fn locate(target: &BookTarget, reports: &[CategoryReport], probes: &[ProbeResult], filter: &SlotFilter) -> Option<Located> {
	let date = target.date.trim();
	let hour = normalize_time(&target.hour);
	let subtime = target.subtime.as_deref().map(normalize_time).filter(|s| !s.is_empty());

	if let Some(wanted) = &subtime {
		let probed = probes.iter().find_map(|probe| {
			probe
				.buckets
				.iter()
				.find(|b| b.date == date && normalize_time(&b.hour) == hour && b.subtimes.iter().any(|t| normalize_time(t) == *wanted))
				.map(|b| Located {
					category: probe.category.clone(),
					date: b.date.clone(),
					cell: b.hour.clone(),
					subtime: Some(wanted.clone()),
				})
		});
		if probed.is_some() {
			return probed.filter(|l| filter.admits(&l.date, wanted));
		}
	}

	let wanted = subtime.unwrap_or(hour);
	reports.iter().find_map(|report| {
		report
			.available_slots()
			.find(|slot| slot.date == date && slot.subtime.as_deref().is_some_and(|fine| normalize_time(fine) == wanted))
			.filter(|slot| filter.admits(&slot.date, &wanted))
			.map(|slot| Located {
				category: report.name.clone(),
				date: slot.date.clone(),
				cell: slot.subtime.clone().unwrap_or_else(|| slot.hour.clone()),
				subtime: None,
			})
	})
}

/// Result for a target that was not discovered in this flow. No page
/// interaction happens for it.
pub fn rejected(target: &BookTarget) -> BookingResult {
	BookingResult {
		success: false,
		message: format!(
			"slot {} {} was not found in this search's results; nothing was booked",
			target.date,
			target.effective_time()
		),
		target: target.clone(),
	}
}

/// Selects the located slot, confirms it once, and reads the portal's reply.
///
/// Failures before the confirm click are errors of the flow. Once the
/// confirm click went out nothing is retried: an unreadable reply is
/// reported as an unconfirmed booking.
pub async fn book(
	locator: &mut Locator<'_>,
	target: &BookTarget,
	located: &Located,
	config: &EngineConfig,
	reporter: &Reporter,
) -> Result<BookingResult> {
	reporter.checkpoint()?;
	let time = located.subtime.as_deref().unwrap_or(&located.cell);
	reporter.status(Step::Book, format!("booking {} {} {time}", located.category, located.date));
	info!(target = "randevu.booking", category = %located.category, date = %located.date, %time, "booking slot");

	search::select_category(locator, &located.category, config, reporter).await?;
	locator.click(&portal::bucket_cell(&located.date, &located.cell)).await?;
	config.settle().await;

	if let Some(subtime) = &located.subtime {
		let entry = portal::subtime_entry(subtime);
		let Some(element) = locator.wait_for(&entry, config.listing_polls, config.poll_interval).await? else {
			return Err(EngineError::FormFieldNotFound(entry.name));
		};
		locator.click_element(&element, &entry.name).await?;
		config.settle().await;
	}

	let confirm = portal::booking_confirm_button();
	let Some(button) = locator.wait_for(&confirm, config.listing_polls, config.poll_interval).await? else {
		return Err(EngineError::FormFieldNotFound(confirm.name));
	};
	reporter.checkpoint()?;
	locator.click_element(&button, &confirm.name).await?;
	config.settle().await;

	let (success, message) = match read_reply(locator, config).await {
		Ok(text) => (portal::is_booking_confirmation(&text), text),
		Err(err) => {
			warn!(target = "randevu.booking", error = %err, "booking reply unreadable");
			(false, err.to_string())
		}
	};
	info!(target = "randevu.booking", success, %message, "booking finished");
	Ok(BookingResult {
		success,
		message,
		target: target.clone(),
	})
}

async fn read_reply(locator: &mut Locator<'_>, config: &EngineConfig) -> Result<String> {
	let target = portal::booking_message();
	for attempt in 0..config.listing_polls.max(1) {
		match locator.read_text(&target).await {
			Ok(Some(text)) => return Ok(text),
			Ok(None) => {}
			Err(err) => return Err(EngineError::BookingUnconfirmed(err.to_string())),
		}
		if attempt + 1 < config.listing_polls {
			tokio::time::sleep(config.poll_interval).await;
		}
	}
	Err(EngineError::BookingUnconfirmed("no confirmation message was shown".to_string()))
}

#[cfg(test)]
mod tests {
	use chrono::NaiveDate;
	use randevu_protocol::{CategoryStatus, ProbedBucket, SlotCandidate, SlotState};

	use super::*;

	fn no_filter() -> SlotFilter {
		SlotFilter::new(None, None, NaiveDate::from_ymd_opt(2026, 2, 25).unwrap())
	}

	fn report() -> CategoryReport {
		let slot = |hour: &str, subtime: Option<&str>| SlotCandidate {
			category: "Kardiyoloji".into(),
			date: "26.02.2026".into(),
			hour: hour.into(),
			subtime: subtime.map(str::to_string),
			state: SlotState::Available,
		};
		CategoryReport {
			name: "Kardiyoloji".into(),
			status: CategoryStatus::Available,
			slots: vec![slot("16:00", None), slot("09:00", Some("09:20"))],
			formatted: String::new(),
			error: None,
		}
	}

	fn probes() -> Vec<ProbeResult> {
		vec![ProbeResult {
			category: "Kardiyoloji".into(),
			buckets: vec![ProbedBucket {
				date: "26.02.2026".into(),
				hour: "16:00".into(),
				subtimes: vec!["16:10".into(), "16:20".into()],
			}],
		}]
	}

	fn target(hour: &str, subtime: Option<&str>) -> BookTarget {
		BookTarget {
			date: "26.02.2026".into(),
			hour: hour.into(),
			subtime: subtime.map(str::to_string),
		}
	}

	#[test]
	fn probed_subtime_is_located_inside_its_bucket() {
		let located = locate(&target("16:00", Some("16.10")), &[report()], &probes(), &no_filter()).unwrap();
		assert_eq!(located.cell, "16:00");
		assert_eq!(located.subtime.as_deref(), Some("16:10"));
	}

	#[test]
	fn fine_listing_cell_is_clicked_directly() {
		let located = locate(&target("09:00", Some("09:20")), &[report()], &[], &no_filter()).unwrap();
		assert_eq!(located.cell, "09:20");
		assert_eq!(located.subtime, None);
	}

	#[test]
	fn fine_cell_matches_a_target_given_by_hour_alone() {
		let located = locate(&target("09:20", None), &[report()], &[], &no_filter()).unwrap();
		assert_eq!(located.cell, "09:20");
		assert_eq!(located.subtime, None);
	}

	#[test]
	fn coarse_bucket_needs_one_of_its_subtimes() {
		assert_eq!(locate(&target("16:00", None), &[report()], &probes(), &no_filter()), None);
		assert_eq!(locate(&target("16:00", None), &[report()], &[], &no_filter()), None);
	}

	#[test]
	fn undiscovered_and_filtered_targets_are_not_located() {
		assert_eq!(locate(&target("16:00", Some("16:50")), &[report()], &probes(), &no_filter()), None);
		assert_eq!(locate(&target("11:00", None), &[report()], &probes(), &no_filter()), None);
		let mornings = SlotFilter::new(None, Some("-12:00"), NaiveDate::from_ymd_opt(2026, 2, 25).unwrap());
		assert_eq!(locate(&target("16:00", Some("16:10")), &[report()], &probes(), &mornings), None);
	}
}
