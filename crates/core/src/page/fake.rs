//! Scripted in-memory portal for exercising the engine without a browser.
//!
//! A [`PortalScript`] describes how the portal behaves (login layout, CAPTCHA,
//! categories and their listings, bucket contents, booking reply); a
//! [`ScriptedPortal`] renders that script as a small element model and
//! answers [`PortalPage`] calls against it. Every interaction is appended to
//! an [`Action`] journal that tests assert against.
//!
//! # Example
//!
//! ```ignore
//! let script = PortalScript::default()
//!     .with_category(CategoryScript::new("Kardiyoloji").cell("26.02.2026", "16:00", CellState::Open));
//! let factory = Arc::new(ScriptedFactory::new(script));
//! let engine = Engine::new(EngineConfig::for_tests(), factory.clone());
//! // ... run a request, then inspect factory.journal()
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use randevu_protocol::PatientId;
use regex::RegexBuilder;

use super::{CaptchaState, CellState, ElementRef, GridCell, PageFactory, PortalPage, Strategy};
use crate::error::{EngineError, Result};
use crate::patient::MONTHS_TR;
use crate::portal::DIALOG_SCOPE;

/// Interactions recorded by the scripted portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
	Open(PatientId),
	Goto(String),
	Click(String),
	Fill { field: String, value: String },
	PressEnter(String),
	Choose { field: String, item: String },
	Dismiss,
	Screenshot(PathBuf),
	Close,
}

/// How the birth date is collected on the login form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BirthLayout {
	/// One `DD.MM.YYYY` text field.
	Single,
	/// Separate year, month and day selectors.
	Combos,
}

/// CAPTCHA behavior on the login form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaScript {
	Absent,
	/// Shown, and reported solved after this many pending polls.
	SolvedAfter(u32),
	/// Shown and never solved.
	Never,
}

/// One selectable category and its listing.
#[derive(Debug, Clone, Default)]
pub struct CategoryScript {
	pub name: String,
	pub cells: Vec<GridCell>,
	/// Extra page text rendered with the listing.
	pub text: String,
	/// Sub-times revealed when a bucket is opened; buckets absent here open without entries.
	pub subtimes: HashMap<(String, String), Vec<String>>,
	/// Listing fails to render at all.
	pub broken: bool,
}

impl CategoryScript {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..Self::default()
		}
	}

	pub fn cell(mut self, date: &str, time: &str, state: CellState) -> Self {
		self.cells.push(GridCell::new(date, time, state));
		self
	}

	pub fn text(mut self, text: impl Into<String>) -> Self {
		self.text = text.into();
		self
	}

	pub fn subtimes(mut self, date: &str, hour: &str, times: &[&str]) -> Self {
		self.subtimes
			.insert((date.to_string(), hour.to_string()), times.iter().map(|t| t.to_string()).collect());
		self
	}

	pub fn broken(mut self) -> Self {
		self.broken = true;
		self
	}
}

type SelectHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Behavior of the scripted portal.
#[derive(Clone)]
pub struct PortalScript {
	pub birth_layout: BirthLayout,
	pub captcha: CaptchaScript,
	pub consent_present: bool,
	pub login_rejection: Option<String>,
	pub info_dialog: bool,
	/// Values a field reports on read-back regardless of what was chosen.
	pub readback_overrides: HashMap<String, String>,
	pub categories: Vec<CategoryScript>,
	/// Category shown as selected before any choice; defaults to none.
	pub default_category: Option<String>,
	pub search_results: Vec<String>,
	/// Notification shown after confirming a booking; `None` shows nothing.
	pub booking_reply: Option<String>,
	/// Number of initial navigations that fail.
	pub navigation_failures: u32,
	/// Time a page takes to shut down.
	pub close_delay: Duration,
	on_select: Option<SelectHook>,
}

impl Default for PortalScript {
	fn default() -> Self {
		Self {
			birth_layout: BirthLayout::Single,
			captcha: CaptchaScript::Absent,
			consent_present: true,
			login_rejection: None,
			info_dialog: false,
			readback_overrides: HashMap::new(),
			categories: Vec::new(),
			default_category: None,
			search_results: Vec::new(),
			booking_reply: Some("Randevunuz başarıyla oluşturulmuştur.".to_string()),
			navigation_failures: 0,
			close_delay: Duration::ZERO,
			on_select: None,
		}
	}
}

impl fmt::Debug for PortalScript {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PortalScript")
			.field("birth_layout", &self.birth_layout)
			.field("captcha", &self.captcha)
			.field("categories", &self.categories.iter().map(|c| &c.name).collect::<Vec<_>>())
			.finish_non_exhaustive()
	}
}

impl PortalScript {
	pub fn with_birth_combos(mut self) -> Self {
		self.birth_layout = BirthLayout::Combos;
		self
	}

	pub fn with_captcha(mut self, captcha: CaptchaScript) -> Self {
		self.captcha = captcha;
		self
	}

	pub fn without_consent(mut self) -> Self {
		self.consent_present = false;
		self
	}

	pub fn rejecting_login(mut self, message: impl Into<String>) -> Self {
		self.login_rejection = Some(message.into());
		self
	}

	pub fn with_info_dialog(mut self) -> Self {
		self.info_dialog = true;
		self
	}

	pub fn with_readback(mut self, field: &str, value: &str) -> Self {
		self.readback_overrides.insert(field.to_string(), value.to_string());
		self
	}

	pub fn with_category(mut self, category: CategoryScript) -> Self {
		self.categories.push(category);
		self
	}

	pub fn with_default_category(mut self, name: impl Into<String>) -> Self {
		self.default_category = Some(name.into());
		self
	}

	pub fn with_search_results(mut self, results: &[&str]) -> Self {
		self.search_results = results.iter().map(|r| r.to_string()).collect();
		self
	}

	pub fn with_booking_reply(mut self, reply: Option<&str>) -> Self {
		self.booking_reply = reply.map(str::to_string);
		self
	}

	pub fn failing_navigation(mut self, times: u32) -> Self {
		self.navigation_failures = times;
		self
	}

	pub fn with_close_delay(mut self, delay: Duration) -> Self {
		self.close_delay = delay;
		self
	}

	/// Runs `hook` whenever a category is chosen, before its listing renders.
	pub fn on_select(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
		self.on_select = Some(Arc::new(hook));
		self
	}

	fn category(&self, name: &str) -> Option<&CategoryScript> {
		self.categories.iter().find(|c| c.name == name)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
	Blank,
	Login,
	Main,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Dialog {
	Info,
	SearchResults(Vec<String>),
	Bucket { date: String, hour: String, times: Vec<String> },
}

#[derive(Debug, Default)]
struct Element {
	key: String,
	tag: &'static str,
	role: &'static str,
	label: String,
	text: String,
	attrs: Vec<(&'static str, String)>,
	css: Vec<&'static str>,
	in_dialog: bool,
	cell: Option<(String, String)>,
}

impl Element {
	fn new(key: impl Into<String>, tag: &'static str) -> Self {
		Self {
			key: key.into(),
			tag,
			..Self::default()
		}
	}

	fn role(mut self, role: &'static str) -> Self {
		self.role = role;
		self
	}

	fn label(mut self, label: &str) -> Self {
		self.label = label.to_string();
		self
	}

	fn text(mut self, text: &str) -> Self {
		self.text = text.to_string();
		self
	}

	fn attr(mut self, name: &'static str, value: &str) -> Self {
		self.attrs.push((name, value.to_string()));
		self
	}

	fn css(mut self, selector: &'static str) -> Self {
		self.css.push(selector);
		self
	}

	fn dialog(mut self) -> Self {
		self.in_dialog = true;
		self
	}

	fn matches(&self, strategy: &Strategy) -> Result<bool> {
		let regex = |pattern: &str| {
			RegexBuilder::new(pattern)
				.case_insensitive(true)
				.build()
				.map_err(|err| EngineError::Driver(format!("invalid pattern {pattern:?}: {err}")))
		};
		Ok(match strategy {
			Strategy::Label { pattern } => !self.label.is_empty() && regex(pattern)?.is_match(&self.label),
			Strategy::Role { role, name } => {
				let accessible = if self.text.is_empty() { &self.label } else { &self.text };
				self.role == role && regex(name)?.is_match(accessible)
			}
			Strategy::Attribute { tag, attributes, needle } => {
				let needle = needle.to_lowercase();
				(tag == "*" || self.tag == tag)
					&& self
						.attrs
						.iter()
						.any(|(name, value)| attributes.iter().any(|a| a == name) && value.to_lowercase().contains(&needle))
			}
			Strategy::Text { scope, pattern } => {
				let in_scope = scope == "body" || (scope == DIALOG_SCOPE && self.in_dialog);
				in_scope && !self.text.is_empty() && regex(pattern)?.is_match(&self.text)
			}
			Strategy::Css { selector } => self.css.iter().any(|s| s == selector),
			Strategy::GridCell { date, time } => self.cell.as_ref().is_some_and(|(d, t)| d == date && t == time),
		})
	}
}

#[derive(Debug)]
struct PortalState {
	script: Arc<PortalScript>,
	journal: Arc<Mutex<Vec<Action>>>,
	screen: Screen,
	alive: bool,
	authenticated: bool,
	navigation_failures_left: u32,
	fields: HashMap<String, String>,
	consent_checked: bool,
	captcha_polls: u32,
	notification: Option<String>,
	dialog: Option<Dialog>,
	selected_category: Option<String>,
	selected_subtime: Option<String>,
}

impl PortalState {
	fn record(&self, action: Action) {
		self.journal.lock().push(action);
	}

	fn ensure_alive(&self) -> Result<()> {
		if self.alive {
			Ok(())
		} else {
			Err(EngineError::Driver("target crashed".to_string()))
		}
	}

	fn elements(&self) -> Vec<Element> {
		let mut out = Vec::new();
		match self.screen {
			Screen::Blank => return out,
			Screen::Login => self.login_elements(&mut out),
			Screen::Main => self.main_elements(&mut out),
		}
		if let Some(message) = &self.notification {
			out.push(
				Element::new("notification", "vaadin-notification-card")
					.css("vaadin-notification-card")
					.text(message),
			);
		}
		out
	}

	fn login_elements(&self, out: &mut Vec<Element>) {
		out.push(
			Element::new("identity", "input")
				.label("T.C. Kimlik No")
				.attr("name", "tcKimlikNo")
				.attr("placeholder", "T.C. Kimlik Numarası"),
		);
		match self.script.birth_layout {
			BirthLayout::Single => out.push(
				Element::new("birth", "input")
					.label("Doğum Tarihi")
					.attr("name", "dogumTarihi")
					.attr("placeholder", "gg.aa.yyyy"),
			),
			BirthLayout::Combos => {
				for (key, label) in [("year", "Yıl"), ("month", "Ay"), ("day", "Gün")] {
					out.push(Element::new(key, "vaadin-combo-box").role("combobox").label(label));
				}
			}
		}
		if self.script.consent_present {
			out.push(
				Element::new("consent", "vaadin-checkbox")
					.label("KVKK Aydınlatma Metni'ni okudum")
					.css("vaadin-checkbox"),
			);
		}
		out.push(Element::new("submit", "vaadin-button").role("button").text("Giriş"));
	}

	fn main_elements(&self, out: &mut Vec<Element>) {
		out.push(Element::new("logout", "vaadin-button").role("button").text("Güvenli Çıkış"));
		out.push(
			Element::new("unit-search", "input")
				.label("Birim / Doktor Ara")
				.attr("placeholder", "Birim veya doktor ara"),
		);
		out.push(Element::new("category", "vaadin-combo-box").role("combobox").label("Randevu Türü"));
		let listed = self.selected_category.as_deref().and_then(|name| self.script.category(name));
		if let Some(category) = listed.filter(|c| !c.broken) {
			for cell in &category.cells {
				let mut element = Element::new(format!("cell|{}|{}", cell.date, cell.time), "div");
				element.cell = Some((cell.date.clone(), cell.time.clone()));
				out.push(element);
			}
		}
		match &self.dialog {
			Some(Dialog::Info) => {
				out.push(Element::new("info-text", "div").dialog().text("Eksik bilgilerinizi tamamlayınız"));
				out.push(Element::new("info-phone", "input").dialog().attr("placeholder", "5xx xxx xx xx"));
				out.push(Element::new("info-confirm", "vaadin-button").dialog().role("button").text("Onayla"));
			}
			Some(Dialog::SearchResults(results)) => {
				for (i, result) in results.iter().enumerate() {
					out.push(Element::new(format!("result|{i}"), "vaadin-item").dialog().text(result));
				}
			}
			Some(Dialog::Bucket { times, .. }) => {
				for time in times {
					out.push(Element::new(format!("sub|{time}"), "vaadin-button").dialog().role("button").text(time));
				}
				out.push(Element::new("book-confirm", "vaadin-button").dialog().role("button").text("Randevu Al"));
			}
			None => {}
		}
	}

	fn element(&self, element: &ElementRef) -> Result<Element> {
		self.elements()
			.into_iter()
			.find(|e| e.key == element.0)
			.ok_or_else(|| EngineError::Driver(format!("element {} is detached", element.0)))
	}

	fn combo_items(&self, key: &str) -> Vec<String> {
		match key {
			"year" => (1920..=2026).rev().map(|y| y.to_string()).collect(),
			"month" => MONTHS_TR.iter().map(|m| m.to_string()).collect(),
			"day" => (1..=31).map(|d| format!("{d:02}")).collect(),
			"category" => self.script.categories.iter().map(|c| c.name.clone()).collect(),
			_ => Vec::new(),
		}
	}

	fn captcha_state(&self) -> CaptchaState {
		if self.screen != Screen::Login {
			return CaptchaState::Absent;
		}
		match self.script.captcha {
			CaptchaScript::Absent => CaptchaState::Absent,
			CaptchaScript::SolvedAfter(n) if self.captcha_polls > n => CaptchaState::Solved,
			CaptchaScript::SolvedAfter(_) | CaptchaScript::Never => CaptchaState::Pending,
		}
	}

	fn submit_login(&mut self) {
		let captcha_ok = matches!(self.captcha_state(), CaptchaState::Absent | CaptchaState::Solved);
		let birth_ok = match self.script.birth_layout {
			BirthLayout::Single => self.fields.contains_key("birth"),
			BirthLayout::Combos => ["year", "month", "day"].iter().all(|k| self.fields.contains_key(*k)),
		};
		let consent_ok = !self.script.consent_present || self.consent_checked;
		if !captcha_ok {
			self.notification = Some("Lütfen robot olmadığınızı doğrulayınız.".to_string());
		} else if !(self.fields.contains_key("identity") && birth_ok && consent_ok) {
			self.notification = Some("Zorunlu alanları doldurunuz.".to_string());
		} else if let Some(message) = &self.script.login_rejection {
			self.notification = Some(message.clone());
		} else {
			self.authenticated = true;
			self.screen = Screen::Main;
			self.notification = None;
			if self.script.info_dialog {
				self.dialog = Some(Dialog::Info);
			}
		}
	}

	fn click(&mut self, key: &str) {
		match key {
			"consent" => self.consent_checked = !self.consent_checked,
			"submit" => self.submit_login(),
			"info-confirm" => self.dialog = None,
			"logout" => {
				self.authenticated = false;
				self.screen = Screen::Login;
			}
			"book-confirm" => {
				self.dialog = None;
				self.notification = self.script.booking_reply.clone();
			}
			_ => {
				if let Some(choice) = key.strip_prefix("result|") {
					let picked = match &self.dialog {
						Some(Dialog::SearchResults(results)) => choice.parse::<usize>().ok().and_then(|i| results.get(i)).cloned(),
						_ => None,
					};
					if let Some(text) = picked {
						self.fields.insert("unit-search".to_string(), text);
					}
					self.dialog = None;
				} else if let Some(time) = key.strip_prefix("sub|") {
					self.selected_subtime = Some(time.to_string());
				} else if let Some(rest) = key.strip_prefix("cell|") {
					let (date, hour) = rest.split_once('|').unwrap_or((rest, ""));
					let times = self
						.selected_category
						.as_deref()
						.and_then(|name| self.script.category(name))
						.filter(|c| c.cells.iter().any(|cell| cell.date == date && cell.time == hour))
						.map(|c| c.subtimes.get(&(date.to_string(), hour.to_string())).cloned().unwrap_or_default());
					if let Some(times) = times {
						self.dialog = Some(Dialog::Bucket {
							date: date.to_string(),
							hour: hour.to_string(),
							times,
						});
						self.selected_subtime = None;
					}
				}
			}
		}
	}
}

/// Cloneable view of one scripted page for test control.
#[derive(Clone)]
pub struct PortalHandle {
	state: Arc<Mutex<PortalState>>,
}

impl PortalHandle {
	/// Makes every further call on the page fail as if the browser died.
	pub fn crash(&self) {
		self.state.lock().alive = false;
	}

	pub fn is_authenticated(&self) -> bool {
		self.state.lock().authenticated
	}

	/// Drops the portal-side login, as a server-side session expiry would.
	pub fn expire_login(&self) {
		let mut state = self.state.lock();
		state.authenticated = false;
		state.screen = Screen::Login;
	}

	/// Date and hour of the bucket whose detail overlay is open.
	pub fn open_bucket(&self) -> Option<(String, String)> {
		match &self.state.lock().dialog {
			Some(Dialog::Bucket { date, hour, .. }) => Some((date.clone(), hour.clone())),
			_ => None,
		}
	}

	/// Sub-time currently selected inside an open bucket.
	pub fn selected_subtime(&self) -> Option<String> {
		self.state.lock().selected_subtime.clone()
	}

	pub fn journal(&self) -> Vec<Action> {
		self.state.lock().journal.lock().clone()
	}
}

/// A scripted page.
pub struct ScriptedPortal {
	state: Arc<Mutex<PortalState>>,
}

impl ScriptedPortal {
	pub fn new(script: PortalScript) -> Self {
		Self::with_journal(Arc::new(script), Arc::new(Mutex::new(Vec::new())))
	}

	fn with_journal(script: Arc<PortalScript>, journal: Arc<Mutex<Vec<Action>>>) -> Self {
		let state = PortalState {
			navigation_failures_left: script.navigation_failures,
			selected_category: script.default_category.clone(),
			script,
			journal,
			screen: Screen::Login,
			alive: true,
			authenticated: false,
			fields: HashMap::new(),
			consent_checked: false,
			captcha_polls: 0,
			notification: None,
			dialog: None,
			selected_subtime: None,
		};
		Self {
			state: Arc::new(Mutex::new(state)),
		}
	}

	pub fn handle(&self) -> PortalHandle {
		PortalHandle {
			state: Arc::clone(&self.state),
		}
	}
}

#[async_trait]
impl PortalPage for ScriptedPortal {
	async fn goto(&mut self, url: &str) -> Result<()> {
		let mut state = self.state.lock();
		state.ensure_alive()?;
		state.record(Action::Goto(url.to_string()));
		if state.navigation_failures_left > 0 {
			state.navigation_failures_left -= 1;
			state.screen = Screen::Blank;
			return Err(EngineError::Driver("net::ERR_CONNECTION_RESET".to_string()));
		}
		state.screen = if state.authenticated { Screen::Main } else { Screen::Login };
		state.notification = None;
		state.dialog = None;
		Ok(())
	}

	async fn current_url(&mut self) -> Result<String> {
		let state = self.state.lock();
		state.ensure_alive()?;
		Ok(match state.screen {
			Screen::Blank => "about:blank".to_string(),
			Screen::Login | Screen::Main => "https://portal.test/main".to_string(),
		})
	}

	async fn query(&mut self, strategy: &Strategy) -> Result<Option<ElementRef>> {
		Ok(self.query_all(strategy).await?.into_iter().next())
	}

	async fn query_all(&mut self, strategy: &Strategy) -> Result<Vec<ElementRef>> {
		let state = self.state.lock();
		state.ensure_alive()?;
		let mut found = Vec::new();
		for element in state.elements() {
			if element.matches(strategy)? {
				found.push(ElementRef(element.key));
			}
		}
		Ok(found)
	}

	async fn click(&mut self, element: &ElementRef) -> Result<()> {
		let mut state = self.state.lock();
		state.ensure_alive()?;
		state.element(element)?;
		state.record(Action::Click(element.0.clone()));
		state.click(&element.0);
		Ok(())
	}

	async fn fill(&mut self, element: &ElementRef, value: &str) -> Result<()> {
		let mut state = self.state.lock();
		state.ensure_alive()?;
		state.element(element)?;
		state.record(Action::Fill {
			field: element.0.clone(),
			value: value.to_string(),
		});
		state.fields.insert(element.0.clone(), value.to_string());
		Ok(())
	}

	async fn press_enter(&mut self, element: &ElementRef) -> Result<()> {
		let mut state = self.state.lock();
		state.ensure_alive()?;
		state.element(element)?;
		state.record(Action::PressEnter(element.0.clone()));
		if element.0 == "unit-search" {
			let query = state.fields.get("unit-search").map(|q| q.to_lowercase()).unwrap_or_default();
			let results = state
				.script
				.search_results
				.iter()
				.filter(|r| r.to_lowercase().contains(&query))
				.cloned()
				.collect();
			state.dialog = Some(Dialog::SearchResults(results));
		}
		Ok(())
	}

	async fn is_checked(&mut self, element: &ElementRef) -> Result<bool> {
		let state = self.state.lock();
		state.ensure_alive()?;
		state.element(element)?;
		Ok(element.0 == "consent" && state.consent_checked)
	}

	async fn input_value(&mut self, element: &ElementRef) -> Result<String> {
		let state = self.state.lock();
		state.ensure_alive()?;
		state.element(element)?;
		if let Some(value) = state.script.readback_overrides.get(&element.0) {
			return Ok(value.clone());
		}
		if element.0 == "category" {
			return Ok(state.selected_category.clone().unwrap_or_default());
		}
		Ok(state.fields.get(&element.0).cloned().unwrap_or_default())
	}

	async fn text(&mut self, element: &ElementRef) -> Result<String> {
		let state = self.state.lock();
		state.ensure_alive()?;
		let element = state.element(element)?;
		Ok(if element.text.is_empty() { element.label } else { element.text })
	}

	async fn combo_items(&mut self, element: &ElementRef) -> Result<Vec<String>> {
		let state = self.state.lock();
		state.ensure_alive()?;
		state.element(element)?;
		Ok(state.combo_items(&element.0))
	}

	async fn choose_combo_item(&mut self, element: &ElementRef, item: &str) -> Result<()> {
		let hook = {
			let mut state = self.state.lock();
			state.ensure_alive()?;
			state.element(element)?;
			let offered = state.combo_items(&element.0).into_iter().find(|i| i.eq_ignore_ascii_case(item.trim()));
			let Some(offered) = offered else {
				return Err(EngineError::Driver(format!("'{item}' is not an option of {}", element.0)));
			};
			state.record(Action::Choose {
				field: element.0.clone(),
				item: offered.clone(),
			});
			if element.0 == "category" {
				state.selected_category = Some(offered.clone());
				state.selected_subtime = None;
				state.dialog = None;
				state.notification = None;
				state.script.on_select.clone().map(|hook| (hook, offered))
			} else {
				state.fields.insert(element.0.clone(), offered);
				None
			}
		};
		if let Some((hook, name)) = hook {
			hook(&name);
		}
		Ok(())
	}

	async fn dismiss(&mut self) -> Result<()> {
		let mut state = self.state.lock();
		state.ensure_alive()?;
		state.record(Action::Dismiss);
		state.dialog = None;
		Ok(())
	}

	async fn captcha(&mut self) -> Result<CaptchaState> {
		let mut state = self.state.lock();
		state.ensure_alive()?;
		let current = state.captcha_state();
		if current == CaptchaState::Pending {
			state.captcha_polls += 1;
		}
		Ok(current)
	}

	async fn grid_cells(&mut self) -> Result<Vec<GridCell>> {
		let state = self.state.lock();
		state.ensure_alive()?;
		if state.screen != Screen::Main {
			return Ok(Vec::new());
		}
		let Some(category) = state.selected_category.as_deref().and_then(|name| state.script.category(name)) else {
			return Ok(Vec::new());
		};
		if category.broken {
			return Err(EngineError::Driver(format!("listing for {} failed to render", category.name)));
		}
		Ok(category.cells.clone())
	}

	async fn body_text(&mut self) -> Result<String> {
		let state = self.state.lock();
		state.ensure_alive()?;
		let mut text: Vec<String> = state
			.elements()
			.into_iter()
			.map(|e| if e.text.is_empty() { e.label } else { e.text })
			.filter(|t| !t.is_empty())
			.collect();
		if state.screen == Screen::Main {
			if let Some(category) = state.selected_category.as_deref().and_then(|name| state.script.category(name)) {
				text.push(category.text.clone());
			}
		}
		Ok(text.join("\n"))
	}

	async fn screenshot(&mut self, path: &Path) -> Result<()> {
		let state = self.state.lock();
		state.ensure_alive()?;
		state.record(Action::Screenshot(path.to_path_buf()));
		std::fs::write(path, b"\x89PNG\r\n\x1a\n").map_err(|source| EngineError::Io {
			path: path.to_path_buf(),
			source,
		})
	}

	async fn is_alive(&mut self) -> bool {
		self.state.lock().alive
	}

	async fn close(&mut self) -> Result<()> {
		let delay = self.state.lock().script.close_delay;
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}
		let mut state = self.state.lock();
		state.record(Action::Close);
		state.alive = false;
		Ok(())
	}
}

/// Hands out scripted pages that share one journal.
pub struct ScriptedFactory {
	script: Arc<PortalScript>,
	journal: Arc<Mutex<Vec<Action>>>,
	pages: Mutex<Vec<PortalHandle>>,
}

impl ScriptedFactory {
	pub fn new(script: PortalScript) -> Self {
		Self {
			script: Arc::new(script),
			journal: Arc::new(Mutex::new(Vec::new())),
			pages: Mutex::new(Vec::new()),
		}
	}

	pub fn journal(&self) -> Vec<Action> {
		self.journal.lock().clone()
	}

	pub fn clear_journal(&self) {
		self.journal.lock().clear();
	}

	/// Number of pages opened so far.
	pub fn opened(&self) -> usize {
		self.pages.lock().len()
	}

	pub fn page(&self, index: usize) -> Option<PortalHandle> {
		self.pages.lock().get(index).cloned()
	}

	pub fn last_page(&self) -> Option<PortalHandle> {
		self.pages.lock().last().cloned()
	}
}

#[async_trait]
impl PageFactory for ScriptedFactory {
	async fn open(&self, patient: PatientId) -> Result<Box<dyn PortalPage>> {
		self.journal.lock().push(Action::Open(patient));
		let page = ScriptedPortal::with_journal(Arc::clone(&self.script), Arc::clone(&self.journal));
		self.pages.lock().push(page.handle());
		Ok(Box::new(page))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn login_form_requires_every_field() {
		let mut page = ScriptedPortal::new(PortalScript::default());
		page.goto("https://portal.test/main").await.unwrap();
		let submit = page.query(&Strategy::role("button", "giriş")).await.unwrap().unwrap();
		page.click(&submit).await.unwrap();
		assert!(!page.handle().is_authenticated());
		let notice = page.query(&Strategy::css("vaadin-notification-card")).await.unwrap().unwrap();
		assert!(page.text(&notice).await.unwrap().contains("Zorunlu"));
	}

	#[tokio::test]
	async fn choosing_an_unknown_option_fails() {
		let mut page = ScriptedPortal::new(PortalScript::default().with_birth_combos());
		page.goto("https://portal.test/main").await.unwrap();
		let month = page.query(&Strategy::label("^ay")).await.unwrap().unwrap();
		assert!(page.choose_combo_item(&month, "Mart").await.is_ok());
		assert!(page.choose_combo_item(&month, "March").await.is_err());
		assert_eq!(page.input_value(&month).await.unwrap(), "Mart");
	}

	#[tokio::test]
	async fn unscripted_buckets_open_without_entries() {
		let script = PortalScript::default()
			.with_category(
				CategoryScript::new("Kardiyoloji")
					.cell("26.02.2026", "16:00", CellState::Open)
					.cell("26.02.2026", "17:00", CellState::Open)
					.subtimes("26.02.2026", "16:00", &["16:10", "16:20"]),
			)
			.with_default_category("Kardiyoloji");
		let mut page = ScriptedPortal::new(script);
		page.handle().state.lock().authenticated = true;
		page.goto("https://portal.test/main").await.unwrap();

		let cell = page.query(&Strategy::grid_cell("26.02.2026", "17:00")).await.unwrap().unwrap();
		page.click(&cell).await.unwrap();
		let entries = Strategy::text(DIALOG_SCOPE, r"^\d{1,2}[:.]\d{2}$");
		assert!(page.query_all(&entries).await.unwrap().is_empty());

		let cell = page.query(&Strategy::grid_cell("26.02.2026", "16:00")).await.unwrap().unwrap();
		page.click(&cell).await.unwrap();
		assert_eq!(page.query_all(&entries).await.unwrap().len(), 2);
	}
}
