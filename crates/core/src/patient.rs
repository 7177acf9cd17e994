//! Patient validation and birth-date decomposition.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use randevu_protocol::{Patient, PatientId, mask_identity};
use regex::Regex;

use crate::error::{EngineError, Result};

/// Turkish month names as the portal renders them.
pub const MONTHS_TR: [&str; 12] = [
	"Ocak", "Şubat", "Mart", "Nisan", "Mayıs", "Haziran", "Temmuz", "Ağustos", "Eylül", "Ekim", "Kasım", "Aralık",
];

static BIRTH_DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{1,2})[./-](\d{1,2})[./-](\d{4})$").expect("BIRTH_DATE_RE should compile"));

/// A birth date split into the forms the portal's selectors offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BirthDate {
	date: NaiveDate,
}

impl BirthDate {
	/// Parses `D[D].M[M].YYYY` with `.`, `/` or `-` separators.
	pub fn parse(value: &str) -> Result<Self> {
		let value = value.trim();
		let caps = BIRTH_DATE_RE
			.captures(value)
			.ok_or_else(|| EngineError::InvalidPatient(format!("birth date '{value}' is not DD.MM.YYYY")))?;
		let num = |i: usize| caps[i].parse::<u32>().unwrap_or(0);
		let year = caps[3].parse::<i32>().unwrap_or(0);
		let date = NaiveDate::from_ymd_opt(year, num(2), num(1))
			.ok_or_else(|| EngineError::InvalidPatient(format!("birth date '{value}' is not a calendar date")))?;
		Ok(Self { date })
	}

	pub fn year(&self) -> String {
		self.date.year().to_string()
	}

	pub fn month(&self) -> u32 {
		self.date.month()
	}

	pub fn month_padded(&self) -> String {
		format!("{:02}", self.date.month())
	}

	pub fn month_name(&self) -> &'static str {
		MONTHS_TR[self.date.month0() as usize]
	}

	pub fn day_padded(&self) -> String {
		format!("{:02}", self.date.day())
	}

	/// Single-field form, `DD.MM.YYYY`.
	pub fn formatted(&self) -> String {
		self.date.format("%d.%m.%Y").to_string()
	}

	/// Candidate option texts for the year selector, in preference order.
	pub fn year_candidates(&self) -> Vec<String> {
		vec![self.year()]
	}

	pub fn month_candidates(&self) -> Vec<String> {
		vec![self.month_name().to_string(), self.month_padded(), self.month().to_string()]
	}

	pub fn day_candidates(&self) -> Vec<String> {
		let mut out = vec![self.day_padded()];
		let raw = self.date.day().to_string();
		if raw != out[0] {
			out.push(raw);
		}
		out
	}
}

/// Checks the national identity number shape: 11 digits, first non-zero.
pub fn validate_identity(identity: &str) -> Result<()> {
	let identity = identity.trim();
	let well_formed = identity.len() == 11 && identity.bytes().all(|b| b.is_ascii_digit()) && !identity.starts_with('0');
	if well_formed {
		Ok(())
	} else {
		Err(EngineError::InvalidPatient(format!("identity number '{}' must be 11 digits", mask_identity(identity))))
	}
}

/// A patient whose identity number and birth date passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedPatient {
	pub id: PatientId,
	pub name: String,
	pub identity: String,
	pub birth: BirthDate,
	pub phone: Option<String>,
}

impl ValidatedPatient {
	pub fn new(patient: &Patient) -> Result<Self> {
		validate_identity(&patient.identity_number)?;
		let birth = BirthDate::parse(&patient.birth_date)?;
		Ok(Self {
			id: patient.id,
			name: patient.name.clone(),
			identity: patient.identity_number.trim().to_string(),
			birth,
			phone: patient.phone.clone().filter(|p| !p.trim().is_empty()),
		})
	}

	pub fn masked_identity(&self) -> String {
		mask_identity(&self.identity)
	}
}
