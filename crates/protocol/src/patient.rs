//! Patient records as stored by the record store and referenced by requests.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Record-store key for a patient.
///
/// Accepts either a JSON number or a numeric string on input; always
/// serializes as a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PatientId(pub u64);

impl<'de> Deserialize<'de> for PatientId {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		#[derive(Deserialize)]
		#[serde(untagged)]
		enum Raw {
			Number(u64),
			Text(String),
		}

		match Raw::deserialize(deserializer)? {
			Raw::Number(n) => Ok(PatientId(n)),
			Raw::Text(s) => s
				.trim()
				.parse()
				.map(PatientId)
				.map_err(|_| serde::de::Error::custom(format!("invalid patient id: {s:?}"))),
		}
	}
}

impl fmt::Display for PatientId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// A registered patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
	pub id: PatientId,
	pub name: String,
	/// National identity document number.
	#[serde(alias = "tc_kimlik")]
	pub identity_number: String,
	/// Birth date as `DD.MM.YYYY`.
	#[serde(alias = "dogum_tarihi")]
	pub birth_date: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub phone: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created_at: Option<String>,
}

impl Patient {
	/// Identity number with everything after the first four characters masked.
	pub fn masked_identity(&self) -> String {
		mask_identity(&self.identity_number)
	}
}

/// Masks an identity number for logs: `1234*******`.
pub fn mask_identity(identity: &str) -> String {
	let visible: String = identity.chars().take(4).collect();
	let hidden = identity.chars().count().saturating_sub(4);
	format!("{visible}{}", "*".repeat(hidden))
}

/// Payload for creating a patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientDraft {
	pub name: String,
	#[serde(alias = "tc_kimlik")]
	pub identity_number: String,
	#[serde(alias = "dogum_tarihi")]
	pub birth_date: String,
	#[serde(default)]
	pub phone: Option<String>,
}

/// Partial update for a patient; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientPatch {
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default, alias = "tc_kimlik")]
	pub identity_number: Option<String>,
	#[serde(default, alias = "dogum_tarihi")]
	pub birth_date: Option<String>,
	#[serde(default)]
	pub phone: Option<String>,
}

impl PatientPatch {
	/// Returns `true` when the patch changes nothing.
	pub fn is_empty(&self) -> bool {
		self.name.is_none() && self.identity_number.is_none() && self.birth_date.is_none() && self.phone.is_none()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn patient_id_accepts_numbers_and_numeric_strings() {
		let from_number: PatientId = serde_json::from_str("7").unwrap();
		let from_text: PatientId = serde_json::from_str("\" 7 \"").unwrap();
		assert_eq!(from_number, PatientId(7));
		assert_eq!(from_text, PatientId(7));
		assert!(serde_json::from_str::<PatientId>("\"seven\"").is_err());
		assert_eq!(serde_json::to_string(&PatientId(7)).unwrap(), "7");
	}

	#[test]
	fn legacy_field_names_are_accepted() {
		let draft: PatientDraft = serde_json::from_str(r#"{"name":"Ayşe","tc_kimlik":"12345678901","dogum_tarihi":"05.03.1990"}"#).unwrap();
		assert_eq!(draft.identity_number, "12345678901");
		assert_eq!(draft.birth_date, "05.03.1990");
		assert_eq!(draft.phone, None);
	}

	#[test]
	fn identity_is_masked_after_four_characters() {
		assert_eq!(mask_identity("12345678901"), "1234*******");
		assert_eq!(mask_identity("12"), "12");
	}
}
