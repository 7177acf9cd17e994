//! Semantic targets and phrase lists for the appointment portal.
//!
//! The portal is a Vaadin application with Turkish labels. Everything the
//! engine looks for is named here so the flows read as "fill the identity
//! field" rather than as selector soup.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::locator::Target;
use crate::page::Strategy;

/// CSS scope of modal overlays (info dialog, search results, bucket detail).
pub const DIALOG_SCOPE: &str = "vaadin-dialog-overlay";

pub fn identity_field() -> Target {
	Target::new(
		"identity number field",
		vec![
			Strategy::label(r"(t\.?c\.?|tc).*kimlik"),
			Strategy::attribute("input", &["name", "id"], "tc"),
			Strategy::attribute("input", &["placeholder"], "T.C"),
			Strategy::attribute("input", &["placeholder"], "Kimlik"),
		],
	)
}

pub fn birth_date_field() -> Target {
	Target::new(
		"birth date field",
		vec![
			Strategy::label(r"doğum\s*tarihi"),
			Strategy::attribute("input", &["name", "id"], "dog"),
			Strategy::attribute("input", &["name", "id"], "birth"),
			Strategy::attribute("input", &["placeholder"], "Doğum"),
			Strategy::attribute("input", &["placeholder"], "gg"),
		],
	)
}

pub fn birth_year_combo() -> Target {
	Target::new(
		"birth year selector",
		vec![Strategy::label(r"^\s*y[ıi]l"), Strategy::role("combobox", r"y[ıi]l")],
	)
}

pub fn birth_month_combo() -> Target {
	Target::new("birth month selector", vec![Strategy::label(r"^\s*ay\b"), Strategy::role("combobox", r"^\s*ay\b")])
}

pub fn birth_day_combo() -> Target {
	Target::new("birth day selector", vec![Strategy::label(r"^\s*g[üu]n"), Strategy::role("combobox", r"g[üu]n")])
}

pub fn consent_checkbox() -> Target {
	Target::new(
		"consent checkbox",
		vec![
			Strategy::label(r"kvkk|aydınlatma|açık\s*rıza"),
			Strategy::css("vaadin-checkbox"),
			Strategy::css("input[type=checkbox]"),
		],
	)
}

pub fn submit_button() -> Target {
	Target::new(
		"login submit button",
		vec![
			Strategy::role("button", r"^\s*giriş"),
			Strategy::role("button", r"(devam|sorgula|giriş|ileri|randevu\s*ara)"),
		],
	)
}

/// Elements only present once the patient is logged in.
pub fn logged_in_marker() -> Target {
	Target::new(
		"post-login marker",
		vec![
			Strategy::role("button", r"güvenli\s*çıkış|çıkış"),
			Strategy::role("link", r"randevularım|çıkış"),
			Strategy::text("body", r"güvenli\s*çıkış|randevularım"),
		],
	)
}

pub fn notification() -> Target {
	Target::new(
		"portal notification",
		vec![Strategy::css("vaadin-notification-card"), Strategy::css(".v-Notification")],
	)
}

pub fn info_dialog() -> Target {
	Target::new("information dialog", vec![Strategy::text(DIALOG_SCOPE, r"eksik|bilgi|onayla")])
}

pub fn info_phone_field() -> Target {
	Target::new(
		"information dialog phone field",
		vec![Strategy::attribute("input", &["placeholder"], "5xx"), Strategy::label("telefon")],
	)
}

pub fn info_confirm_button() -> Target {
	Target::new("information dialog confirm button", vec![Strategy::role("button", "onayla")])
}

pub fn unit_search_field() -> Target {
	Target::new(
		"unit or doctor search field",
		vec![
			Strategy::label(r"birim|doktor|hekim"),
			Strategy::attribute("input", &["placeholder"], "ara"),
		],
	)
}

/// Search-result entry containing `hint`.
pub fn unit_search_result(hint: &str) -> Target {
	Target::new(
		format!("search result for '{hint}'"),
		vec![Strategy::text(DIALOG_SCOPE, regex::escape(hint.trim()))],
	)
}

pub fn category_combo() -> Target {
	Target::new(
		"appointment category selector",
		vec![
			Strategy::label(r"randevu\s*t[üu]r"),
			Strategy::role("combobox", r"randevu|klinik|bölüm"),
		],
	)
}

/// Optional explicit "list appointments" action after choosing a category.
pub fn listing_button() -> Target {
	Target::new("listing button", vec![Strategy::role("button", r"^\s*(ara|sorgula|listele|randevu\s*ara)\s*$")])
}

pub fn bucket_cell(date: &str, hour: &str) -> Target {
	Target::new(format!("listing cell {date} {hour}"), vec![Strategy::grid_cell(date, hour)])
}

/// Every sub-time entry of an expanded bucket.
pub fn subtime_entries() -> Target {
	Target::new("sub-time entries", vec![Strategy::text(DIALOG_SCOPE, r"^\s*\d{1,2}[:.]\d{2}\s*$")])
}

/// The entry for one sub-time, accepting both `16:10` and `16.10`.
pub fn subtime_entry(time: &str) -> Target {
	let pattern = match time.trim().split_once(':') {
		Some((h, m)) => {
			let h = match h.trim_start_matches('0') {
				"" => "0",
				h => h,
			};
			format!(r"^\s*0?{}[:.]{}\s*$", regex::escape(h), regex::escape(m))
		}
		None => format!(r"^\s*{}\s*$", regex::escape(time.trim())),
	};
	Target::new(format!("sub-time {time}"), vec![Strategy::text(DIALOG_SCOPE, pattern)])
}

pub fn booking_confirm_button() -> Target {
	Target::new(
		"booking confirm button",
		vec![Strategy::role("button", r"randevu\s*al|onayla|evet|kaydet")],
	)
}

/// Where the portal reports the booking outcome.
pub fn booking_message() -> Target {
	Target::new(
		"booking message",
		vec![
			Strategy::css("vaadin-notification-card"),
			Strategy::css(".v-Notification"),
			Strategy::text(DIALOG_SCOPE, r"randevu"),
		],
	)
}

fn phrases(patterns: &[&str]) -> Vec<Regex> {
	patterns
		.iter()
		.map(|p| RegexBuilder::new(p).case_insensitive(true).build().expect("portal phrase should compile"))
		.collect()
}

/// Explicit "nothing available" phrases.
static NEGATIVE_PHRASES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
	phrases(&[
		r"uygun\s*randevu\s*bulunamad[ıi]",
		r"müsait\s*randevu\s*yok",
		r"randevu\s*bulunamad[ıi]",
		r"seçilen\s*kriterlere\s*uygun\s*kayıt\s*yok",
		r"randevu\s*alamad[ıi]m",
	])
});

static BOOKING_SUCCESS: LazyLock<Vec<Regex>> =
	LazyLock::new(|| phrases(&[r"başar[ıi]", r"oluşturul", r"al[ıi]nm[ıi]şt[ıi]r", r"kaydedil"]));

static BOOKING_FAILURE: LazyLock<Vec<Regex>> =
	LazyLock::new(|| phrases(&[r"başar[ıi]s[ıi]z", r"hata", r"al[ıi]namad[ıi]", r"dolu", r"mevcut\s*randevu"]));

/// Whether `text` states that no appointment is available.
pub fn is_negative_listing(text: &str) -> bool {
	NEGATIVE_PHRASES.iter().any(|re| re.is_match(text))
}

/// Whether a booking message reads as a confirmation.
pub fn is_booking_confirmation(text: &str) -> bool {
	BOOKING_SUCCESS.iter().any(|re| re.is_match(text)) && !BOOKING_FAILURE.iter().any(|re| re.is_match(text))
}
