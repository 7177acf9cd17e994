//! Category selection, primary search and the alternative-category scan.

use randevu_protocol::{CategoryReport, CategoryStatus, SearchParams, Step};
use tracing::{debug, info, warn};

use crate::classify;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::locator::Locator;
use crate::page::GridCell;
use crate::portal;
use crate::progress::Reporter;

/// Category option picked for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primary {
	/// An on-screen option.
	Option(String),
	/// The listing already shown; the portal offers no category options.
	Current(String),
	/// Requested text matched no option.
	Unmatched(String),
}

/// Picks the option for `wanted`: exact match first, then containment.
/// Without `wanted` the current selection, or else the first option, is used.
pub fn resolve_primary(options: &[String], wanted: &str, current: &str) -> Primary {
	let wanted = wanted.trim();
	let current = current.trim();
	if options.is_empty() {
		let name = if wanted.is_empty() { current } else { wanted };
		return Primary::Current(name.to_string());
	}
	if wanted.is_empty() {
		let name = options
			.iter()
			.find(|o| !current.is_empty() && o.trim().eq_ignore_ascii_case(current))
			.or_else(|| options.first());
		return name.map_or_else(|| Primary::Current(current.to_string()), |n| Primary::Option(n.clone()));
	}
	let lowered = wanted.to_lowercase();
	options
		.iter()
		.find(|o| o.trim().to_lowercase() == lowered)
		.or_else(|| options.iter().find(|o| o.to_lowercase().contains(&lowered)))
		.map_or_else(|| Primary::Unmatched(wanted.to_string()), |n| Primary::Option(n.clone()))
}

/// Runs the primary search and, when it shows nothing available, the
/// alternative scan. Reports come back primary first, then alternatives in
/// on-screen order.
pub async fn search(locator: &mut Locator<'_>, params: &SearchParams, config: &EngineConfig, reporter: &Reporter) -> Result<Vec<CategoryReport>> {
	reporter.checkpoint()?;
	reporter.status(Step::Search, "opening appointment search");
	if !params.search_text.trim().is_empty() {
		apply_search_hint(locator, params.search_text.trim(), config, reporter).await?;
	}

	reporter.checkpoint()?;
	let combo_target = portal::category_combo();
	let (options, current) = match locator.find(&combo_target).await? {
		Some(combo) => {
			let options = locator.combo_items(&combo, &combo_target.name).await?;
			let current = locator.input_value(&combo, &combo_target.name).await?;
			(options, current)
		}
		None => (Vec::new(), String::new()),
	};
	debug!(target = "randevu.search", options = options.len(), %current, "category options");

	let primary = resolve_primary(&options, &params.randevu_type, &current);
	let primary_report = match &primary {
		Primary::Option(name) => scan_or_record(locator, name, config, reporter).await?,
		Primary::Current(name) => {
			let name = if name.is_empty() { "varsayılan" } else { name.as_str() };
			reporter.status(Step::SelectCategory, format!("using the listing on screen ({name})"));
			match read_listing(locator, config).await {
				Ok((cells, text)) => classify::classify(name, &cells, &text),
				Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
				Err(err) => record_failure(name, err),
			}
		}
		Primary::Unmatched(wanted) => {
			warn!(target = "randevu.search", %wanted, "no category option matches");
			reporter.status(Step::SelectCategory, format!("no category matches '{wanted}'"));
			classify::unscannable(wanted, "no on-screen category option matches")
		}
	};
	info!(target = "randevu.search", category = %primary_report.name, status = ?primary_report.status, "primary category classified");

	let mut reports = vec![primary_report];
	if reports[0].status != CategoryStatus::Available {
		let primary_name = match &primary {
			Primary::Option(name) => Some(name.as_str()),
			Primary::Current(_) | Primary::Unmatched(_) => None,
		};
		let alternatives: Vec<&String> = options
			.iter()
			.filter(|o| Some(o.as_str()) != primary_name)
			.take(config.max_alternatives)
			.collect();
		let total = alternatives.len();
		for (i, name) in alternatives.into_iter().enumerate() {
			reporter.checkpoint()?;
			let report = scan_or_record(locator, name, config, reporter).await?;
			reporter.status(
				Step::Scanning,
				format!("scanned {} ({}/{total}): {}", report.name, i + 1, status_label(report.status)),
			);
			reports.push(report);
		}
	}

	reporter.checkpoint()?;
	let available = reports.iter().filter(|r| r.status == CategoryStatus::Available).count();
	reporter.status(
		Step::Classify,
		format!("classification complete: {available} of {} categories available", reports.len()),
	);
	Ok(reports)
}

fn status_label(status: CategoryStatus) -> &'static str {
	match status {
		CategoryStatus::Available => "available",
		CategoryStatus::NotAvailable => "not available",
		CategoryStatus::Unknown => "unknown",
	}
}

/// Scans one category; any failure other than cancellation becomes an
/// `UNKNOWN` report.
async fn scan_or_record(locator: &mut Locator<'_>, name: &str, config: &EngineConfig, reporter: &Reporter) -> Result<CategoryReport> {
	match scan_category(locator, name, config, reporter).await {
		Ok(report) => Ok(report),
		Err(EngineError::Cancelled) => Err(EngineError::Cancelled),
		Err(err) => Ok(record_failure(name, err)),
	}
}

fn record_failure(name: &str, err: EngineError) -> CategoryReport {
	let err = match err {
		err @ EngineError::CategoryScanFailure { .. } => err,
		other => EngineError::CategoryScanFailure {
			category: name.to_string(),
			reason: other.to_string(),
		},
	};
	warn!(target = "randevu.search", category = %name, error = %err, "category scan failed");
	classify::unscannable(name, err.to_string())
}

async fn scan_category(locator: &mut Locator<'_>, name: &str, config: &EngineConfig, reporter: &Reporter) -> Result<CategoryReport> {
	let (cells, text) = select_category(locator, name, config, reporter).await?;
	let report = classify::classify(name, &cells, &text);
	debug!(
		target = "randevu.search",
		category = %name,
		cells = cells.len(),
		status = ?report.status,
		"category classified"
	);
	Ok(report)
}

/// Chooses `name` in the category selector and waits for its listing.
///
/// Returns the rendered cells, plus the page text when no cell rendered.
pub async fn select_category(locator: &mut Locator<'_>, name: &str, config: &EngineConfig, reporter: &Reporter) -> Result<(Vec<GridCell>, String)> {
	let target = portal::category_combo();
	let combo = locator.require(&target).await?;
	locator.choose_combo_item(&combo, name, &target.name).await?;
	reporter.status(Step::SelectCategory, format!("category selected: {name}"));
	config.settle().await;

	if let Some(button) = locator.find(&portal::listing_button()).await? {
		locator.click_element(&button, "listing button").await?;
		config.settle().await;
	}
	read_listing(locator, config).await
}

async fn read_listing(locator: &mut Locator<'_>, config: &EngineConfig) -> Result<(Vec<GridCell>, String)> {
	let polls = config.listing_polls.max(1);
	for attempt in 0..polls {
		let cells = locator.grid_cells().await?;
		if !cells.is_empty() {
			return Ok((cells, String::new()));
		}
		if attempt + 1 < polls {
			tokio::time::sleep(config.poll_interval).await;
		}
	}
	let text = locator.body_text().await?;
	Ok((Vec::new(), text))
}

/// Types the unit/doctor hint and picks the first matching result.
/// Nothing here is fatal; misses only produce a status event.
async fn apply_search_hint(locator: &mut Locator<'_>, hint: &str, config: &EngineConfig, reporter: &Reporter) -> Result<()> {
	let field_target = portal::unit_search_field();
	let Some(field) = locator.find(&field_target).await? else {
		reporter.status(Step::Search, format!("no search field for '{hint}'; continuing with category selection"));
		return Ok(());
	};
	let typed = async {
		locator.fill_element(&field, hint, &field_target.name).await?;
		locator.press_enter(&field, &field_target.name).await?;
		config.settle().await;
		locator.wait_for(&portal::unit_search_result(hint), config.listing_polls, config.poll_interval).await
	}
	.await;

	match typed {
		Ok(Some(result)) => {
			locator.click_element(&result, "search result").await?;
			config.settle().await;
			reporter.status(Step::Search, format!("search result selected for '{hint}'"));
		}
		Ok(None) => {
			locator.dismiss().await?;
			reporter.status(Step::Search, format!("no search result for '{hint}'; continuing with category selection"));
		}
		Err(err) => {
			warn!(target = "randevu.search", %hint, error = %err, "search hint failed");
			reporter.status(Step::Search, format!("search for '{hint}' failed; continuing with category selection"));
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn options() -> Vec<String> {
		["Kardiyoloji", "Kardiyoloji - Alt Birim", "Göz Hastalıkları"].iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn exact_option_wins_over_containment() {
		assert_eq!(resolve_primary(&options(), "kardiyoloji", ""), Primary::Option("Kardiyoloji".into()));
		assert_eq!(resolve_primary(&options(), "alt birim", ""), Primary::Option("Kardiyoloji - Alt Birim".into()));
	}

	#[test]
	fn empty_request_uses_current_then_first() {
		assert_eq!(resolve_primary(&options(), "", "Göz Hastalıkları"), Primary::Option("Göz Hastalıkları".into()));
		assert_eq!(resolve_primary(&options(), " ", ""), Primary::Option("Kardiyoloji".into()));
	}

	#[test]
	fn unmatched_and_optionless_cases() {
		assert_eq!(resolve_primary(&options(), "Dermatoloji", ""), Primary::Unmatched("Dermatoloji".into()));
		assert_eq!(resolve_primary(&[], "", "Genel"), Primary::Current("Genel".into()));
	}
}
