//! Sub-time probing of coarse date/hour buckets.

use randevu_protocol::{CategoryReport, CategoryStatus, ProbeResult, ProbedBucket, Step};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::locator::Locator;
use crate::portal;
use crate::progress::Reporter;
use crate::search;

/// `16.10` and `9:10` both become `HH:MM`; anything else is returned trimmed.
pub fn normalize_time(raw: &str) -> String {
	let raw = raw.trim();
	match raw.split_once([':', '.']) {
		Some((h, m)) if !h.is_empty() && h.len() <= 2 && m.len() == 2 && h.chars().chain(m.chars()).all(|c| c.is_ascii_digit()) => {
			format!("{h:0>2}:{m}")
		}
		_ => raw.to_string(),
	}
}

/// Probes every coarse available bucket of every available category.
///
/// Buckets are opened one after another on the shared page. A bucket that
/// does not expand is recorded with no sub-times.
pub async fn probe(locator: &mut Locator<'_>, reports: &[CategoryReport], config: &EngineConfig, reporter: &Reporter) -> Result<Vec<ProbeResult>> {
	let mut results = Vec::new();
	for report in reports.iter().filter(|r| r.status == CategoryStatus::Available) {
		let coarse: Vec<(&str, &str)> = report
			.available_slots()
			.filter(|slot| slot.subtime.is_none())
			.map(|slot| (slot.date.as_str(), slot.hour.as_str()))
			.collect();
		if coarse.is_empty() {
			continue;
		}

		reporter.checkpoint()?;
		let selected = match search::select_category(locator, &report.name, config, reporter).await {
			Ok(_) => true,
			Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
			Err(err) => {
				warn!(target = "randevu.probe", category = %report.name, error = %err, "could not reselect category");
				false
			}
		};

		let mut buckets = Vec::with_capacity(coarse.len());
		for (date, hour) in coarse {
			reporter.checkpoint()?;
			let subtimes = if selected {
				reporter.status(Step::Probe, format!("probing {} {date} {hour}", report.name));
				match probe_bucket(locator, date, hour, config).await {
					Ok(times) => times,
					Err(err) => {
						warn!(target = "randevu.probe", category = %report.name, %date, %hour, error = %err, "bucket did not expand");
						Vec::new()
					}
				}
			} else {
				Vec::new()
			};
			debug!(target = "randevu.probe", category = %report.name, %date, %hour, found = subtimes.len(), "bucket probed");
			buckets.push(ProbedBucket {
				date: date.to_string(),
				hour: hour.to_string(),
				subtimes,
			});
		}
		info!(
			target = "randevu.probe",
			category = %report.name,
			buckets = buckets.len(),
			subtimes = buckets.iter().map(|b| b.subtimes.len()).sum::<usize>(),
			"category probed"
		);
		results.push(ProbeResult {
			category: report.name.clone(),
			buckets,
		});
	}
	Ok(results)
}

async fn probe_bucket(locator: &mut Locator<'_>, date: &str, hour: &str, config: &EngineConfig) -> Result<Vec<String>> {
	locator.click(&portal::bucket_cell(date, hour)).await?;
	config.settle().await;

	let entries = portal::subtime_entries();
	let mut times = Vec::new();
	if locator.wait_for(&entries, config.listing_polls, config.poll_interval).await?.is_some() {
		for element in locator.find_all(&entries).await? {
			let time = normalize_time(&locator.text(&element, &entries.name).await?);
			if !time.is_empty() && !times.contains(&time) {
				times.push(time);
			}
		}
	}
	locator.dismiss().await?;
	Ok(times)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn times_are_normalized_to_colon_form() {
		assert_eq!(normalize_time("16.10"), "16:10");
		assert_eq!(normalize_time(" 9:05 "), "09:05");
		assert_eq!(normalize_time("16:10"), "16:10");
		assert_eq!(normalize_time("öğleden sonra"), "öğleden sonra");
	}
}
