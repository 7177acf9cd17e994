//! Date and time filters for reported sub-times.
//!
//! Formats follow the patient-facing scheduler: `bugun` (today or tomorrow),
//! `DD.MM.YYYY`, `DD.MM.YYYY-DD.MM.YYYY` for dates; `HH:MM-HH:MM`,
//! `HH:MM-`, `-HH:MM` for times; `Yok` or empty for no filter. Values that do
//! not parse let everything through.

use chrono::{Local, NaiveDate, NaiveTime};
use randevu_protocol::{ProbeResult, ProbedBucket, SearchParams};

const DATE_FMT: &str = "%d.%m.%Y";
const TIME_FMT: &str = "%H:%M";

fn is_unset(filter: Option<&str>) -> Option<&str> {
	filter.map(str::trim).filter(|f| !f.is_empty() && !f.eq_ignore_ascii_case("yok"))
}

/// Whether `date` (`DD.MM.YYYY`) passes `filter`.
pub fn date_matches(date: &str, filter: Option<&str>, today: NaiveDate) -> bool {
	let Some(filter) = is_unset(filter) else {
		return true;
	};
	if filter.eq_ignore_ascii_case("bugun") || filter.eq_ignore_ascii_case("bugün") {
		let tomorrow = today.succ_opt().unwrap_or(today);
		return [today, tomorrow].iter().any(|d| d.format(DATE_FMT).to_string() == date.trim());
	}
	let Ok(date) = NaiveDate::parse_from_str(date.trim(), DATE_FMT) else {
		return true;
	};
	match filter.split_once('-') {
		Some((start, end)) => {
			match (NaiveDate::parse_from_str(start.trim(), DATE_FMT), NaiveDate::parse_from_str(end.trim(), DATE_FMT)) {
				(Ok(start), Ok(end)) => start <= date && date <= end,
				_ => true,
			}
		}
		None => NaiveDate::parse_from_str(filter, DATE_FMT).map_or(true, |target| target == date),
	}
}

/// Whether `time` (`HH:MM`) passes `filter`.
pub fn time_matches(time: &str, filter: Option<&str>) -> bool {
	let Some(filter) = is_unset(filter) else {
		return true;
	};
	let Ok(time) = NaiveTime::parse_from_str(time.trim().replace('.', ":").as_str(), TIME_FMT) else {
		return true;
	};
	let Some((start, end)) = filter.split_once('-') else {
		return true;
	};
	let bound = |s: &str| {
		let s = s.trim();
		if s.is_empty() { Ok(None) } else { NaiveTime::parse_from_str(s, TIME_FMT).map(Some) }
	};
	match (bound(start), bound(end)) {
		(Ok(start), Ok(end)) => start.is_none_or(|s| time >= s) && end.is_none_or(|e| time <= e),
		_ => true,
	}
}

/// Date and time restriction carried by one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotFilter {
	date_range: Option<String>,
	time_range: Option<String>,
	today: NaiveDate,
}

impl SlotFilter {
	pub fn new(date_range: Option<&str>, time_range: Option<&str>, today: NaiveDate) -> Self {
		Self {
			date_range: is_unset(date_range).map(str::to_string),
			time_range: is_unset(time_range).map(str::to_string),
			today,
		}
	}

	/// Filter for `params`, evaluated against the local calendar.
	pub fn from_params(params: &SearchParams) -> Self {
		Self::new(params.date_range.as_deref(), params.time_range.as_deref(), Local::now().date_naive())
	}

	pub fn is_empty(&self) -> bool {
		self.date_range.is_none() && self.time_range.is_none()
	}

	pub fn admits(&self, date: &str, time: &str) -> bool {
		date_matches(date, self.date_range.as_deref(), self.today) && time_matches(time, self.time_range.as_deref())
	}

	/// Keeps the sub-times passing both filters; buckets left empty are dropped.
	/// Without any filter the probes are returned as they are.
	pub fn apply(&self, probes: Vec<ProbeResult>) -> Vec<ProbeResult> {
		if self.is_empty() {
			return probes;
		}
		probes
			.into_iter()
			.map(|probe| ProbeResult {
				buckets: probe
					.buckets
					.into_iter()
					.filter(|bucket| date_matches(&bucket.date, self.date_range.as_deref(), self.today))
					.filter_map(|bucket| {
						let subtimes: Vec<String> = bucket
							.subtimes
							.into_iter()
							.filter(|t| time_matches(t, self.time_range.as_deref()))
							.collect();
						(!subtimes.is_empty()).then_some(ProbedBucket { subtimes, ..bucket })
					})
					.collect(),
				..probe
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn today() -> NaiveDate {
		NaiveDate::from_ymd_opt(2026, 2, 25).unwrap()
	}

	#[test]
	fn bugun_means_today_or_tomorrow() {
		assert!(date_matches("25.02.2026", Some("bugun"), today()));
		assert!(date_matches("26.02.2026", Some("bugun"), today()));
		assert!(!date_matches("27.02.2026", Some("bugun"), today()));
	}

	#[test]
	fn date_ranges_are_inclusive() {
		let range = Some("26.02.2026-28.02.2026");
		assert!(date_matches("26.02.2026", range, today()));
		assert!(date_matches("28.02.2026", range, today()));
		assert!(!date_matches("01.03.2026", range, today()));
		assert!(date_matches("05.03.2026", Some("05.03.2026"), today()));
		assert!(!date_matches("06.03.2026", Some("05.03.2026"), today()));
	}

	#[test]
	fn unparseable_values_pass() {
		assert!(date_matches("yakında", Some("26.02.2026"), today()));
		assert!(date_matches("26.02.2026", Some("next week"), today()));
		assert!(time_matches("16:10", Some("sabah")));
		assert!(time_matches("öğle", Some("09:00-12:00")));
		assert!(date_matches("26.02.2026", Some("Yok"), today()));
	}

	#[test]
	fn open_ended_time_ranges() {
		assert!(time_matches("16:10", Some("16:00-17:00")));
		assert!(!time_matches("17:10", Some("16:00-17:00")));
		assert!(time_matches("17:10", Some("16:00-")));
		assert!(!time_matches("15:59", Some("16:00-")));
		assert!(time_matches("09:00", Some("-12:00")));
		assert!(time_matches("9.30", Some("09:00-10:00")));
	}

	#[test]
	fn apply_drops_emptied_buckets() {
		let probes = vec![ProbeResult {
			category: "Kardiyoloji".into(),
			buckets: vec![
				ProbedBucket {
					date: "26.02.2026".into(),
					hour: "16:00".into(),
					subtimes: vec!["16:10".into(), "16:40".into()],
				},
				ProbedBucket {
					date: "27.02.2026".into(),
					hour: "09:00".into(),
					subtimes: vec!["09:20".into()],
				},
			],
		}];
		let unfiltered = SlotFilter::new(None, Some("Yok"), today()).apply(probes.clone());
		assert_eq!(unfiltered, probes);

		let filtered = SlotFilter::new(Some("bugun"), Some("16:30-"), today()).apply(probes);
		assert_eq!(filtered[0].buckets.len(), 1);
		assert_eq!(filtered[0].buckets[0].subtimes, vec!["16:40"]);
	}
}
