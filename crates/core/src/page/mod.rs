//! Page-driver abstraction.
//!
//! The engine never talks to a browser directly. Everything it needs from the
//! rendered portal is expressed by [`PortalPage`]; [`chromium`] implements it
//! over the Chrome DevTools Protocol and [`fake`] implements it as an
//! in-memory scripted portal for tests.

use std::path::Path;

use async_trait::async_trait;
use randevu_protocol::{PatientId, SlotState};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod chromium;
pub mod fake;
mod scripts;

pub use chromium::ChromiumFactory;
pub use fake::{ScriptedFactory, ScriptedPortal};

/// One way of finding an element on the page.
///
/// Patterns are case-insensitive regular expressions; needles are
/// case-insensitive substrings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
	/// Accessible label (`<label>`, `aria-label`, Vaadin `label`) matching `pattern`.
	Label { pattern: String },
	/// Explicit or implicit ARIA role whose accessible name matches `name`.
	Role { role: String, name: String },
	/// Element with tag `tag` whose value for any of `attributes` contains `needle`.
	Attribute { tag: String, attributes: Vec<String>, needle: String },
	/// Element inside `scope` (a CSS selector) whose own text matches `pattern`.
	Text { scope: String, pattern: String },
	/// Plain CSS selector.
	Css { selector: String },
	/// Listing cell for a date column and time row.
	GridCell { date: String, time: String },
}

impl Strategy {
	pub fn label(pattern: impl Into<String>) -> Self {
		Strategy::Label { pattern: pattern.into() }
	}

	pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
		Strategy::Role {
			role: role.into(),
			name: name.into(),
		}
	}

	pub fn attribute(tag: impl Into<String>, attributes: &[&str], needle: impl Into<String>) -> Self {
		Strategy::Attribute {
			tag: tag.into(),
			attributes: attributes.iter().map(|a| a.to_string()).collect(),
			needle: needle.into(),
		}
	}

	pub fn text(scope: impl Into<String>, pattern: impl Into<String>) -> Self {
		Strategy::Text {
			scope: scope.into(),
			pattern: pattern.into(),
		}
	}

	pub fn css(selector: impl Into<String>) -> Self {
		Strategy::Css { selector: selector.into() }
	}

	pub fn grid_cell(date: impl Into<String>, time: impl Into<String>) -> Self {
		Strategy::GridCell {
			date: date.into(),
			time: time.into(),
		}
	}
}

/// Opaque handle to an element resolved by [`PortalPage::query`].
///
/// Handles stay valid until the page re-renders the element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

/// Visual state of a listing cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
	Open,
	Full,
	Closed,
	CapacityFull,
	OpeningSoon,
	Other,
}

impl CellState {
	/// Maps the portal's cue vocabulary (`açık`, `dolu`, `kapalı`, ...) onto a state.
	pub fn from_cue(cue: &str) -> Self {
		let cue = cue.trim().to_lowercase();
		match cue.as_str() {
			"open" | "açık" | "acik" => CellState::Open,
			"full" | "dolu" => CellState::Full,
			"closed" | "kapalı" | "kapali" => CellState::Closed,
			"web_kapasite_dolu" | "capacity_full" => CellState::CapacityFull,
			"açılacak" | "acilacak" | "opening_soon" => CellState::OpeningSoon,
			_ => CellState::Other,
		}
	}

	pub fn slot_state(self) -> SlotState {
		match self {
			CellState::Open => SlotState::Available,
			CellState::Full | CellState::Closed | CellState::CapacityFull | CellState::OpeningSoon => SlotState::NotAvailable,
			CellState::Other => SlotState::Unknown,
		}
	}
}

/// One rendered listing cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
	/// Column date, `DD.MM.YYYY`; empty when no header could be matched.
	pub date: String,
	/// Row time, `HH:MM`.
	pub time: String,
	pub state: CellState,
}

impl GridCell {
	pub fn new(date: impl Into<String>, time: impl Into<String>, state: CellState) -> Self {
		Self {
			date: date.into(),
			time: time.into(),
			state,
		}
	}

	/// Whether this cell is a whole-hour bucket that may expand into sub-times.
	pub fn is_coarse(&self) -> bool {
		self.time.ends_with(":00")
	}
}

/// Presence of a human-verification challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaState {
	Absent,
	Pending,
	Solved,
}

/// A rendered portal page.
///
/// `query`/`query_all` report "nothing matched" as `None`/empty; errors are
/// reserved for driver failures. Implementations do not apply timeouts; the
/// [`Locator`](crate::Locator) bounds every call.
#[async_trait]
pub trait PortalPage: Send {
	async fn goto(&mut self, url: &str) -> Result<()>;
	async fn current_url(&mut self) -> Result<String>;
	async fn query(&mut self, strategy: &Strategy) -> Result<Option<ElementRef>>;
	async fn query_all(&mut self, strategy: &Strategy) -> Result<Vec<ElementRef>>;
	async fn click(&mut self, element: &ElementRef) -> Result<()>;
	/// Replaces the element's value with `value`.
	async fn fill(&mut self, element: &ElementRef, value: &str) -> Result<()>;
	async fn press_enter(&mut self, element: &ElementRef) -> Result<()>;
	async fn is_checked(&mut self, element: &ElementRef) -> Result<bool>;
	async fn input_value(&mut self, element: &ElementRef) -> Result<String>;
	async fn text(&mut self, element: &ElementRef) -> Result<String>;
	/// Option texts of a combo box, in on-screen order.
	async fn combo_items(&mut self, element: &ElementRef) -> Result<Vec<String>>;
	/// Opens the combo box and commits the option whose text equals `item`.
	async fn choose_combo_item(&mut self, element: &ElementRef, item: &str) -> Result<()>;
	/// Closes any open overlay.
	async fn dismiss(&mut self) -> Result<()>;
	async fn captcha(&mut self) -> Result<CaptchaState>;
	async fn grid_cells(&mut self) -> Result<Vec<GridCell>>;
	async fn body_text(&mut self) -> Result<String>;
	async fn screenshot(&mut self, path: &Path) -> Result<()>;
	/// Whether the underlying browsing context still responds.
	async fn is_alive(&mut self) -> bool;
	async fn close(&mut self) -> Result<()>;
}

/// Creates browsing contexts for patients.
#[async_trait]
pub trait PageFactory: Send + Sync {
	async fn open(&self, patient: PatientId) -> Result<Box<dyn PortalPage>>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cues_map_to_slot_states() {
		assert_eq!(CellState::from_cue("Açık").slot_state(), SlotState::Available);
		assert_eq!(CellState::from_cue("dolu").slot_state(), SlotState::NotAvailable);
		assert_eq!(CellState::from_cue("web_kapasite_dolu"), CellState::CapacityFull);
		assert_eq!(CellState::from_cue("açılacak").slot_state(), SlotState::NotAvailable);
		assert_eq!(CellState::from_cue("#c0ffee").slot_state(), SlotState::Unknown);
	}

	#[test]
	fn whole_hours_are_coarse() {
		assert!(GridCell::new("26.02.2026", "16:00", CellState::Open).is_coarse());
		assert!(!GridCell::new("26.02.2026", "16:10", CellState::Open).is_coarse());
	}

	#[test]
	fn strategies_serialize_with_kind_tag() {
		let json = serde_json::to_value(Strategy::label("doğum")).unwrap();
		assert_eq!(json, serde_json::json!({"kind": "label", "pattern": "doğum"}));
	}
}
