//! Resilient element lookup over ordered strategy chains.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{EngineError, Result};
use crate::page::{CaptchaState, ElementRef, GridCell, PortalPage, Strategy};

/// A semantic element ("identity-number field", "consent checkbox") and the
/// strategies that may find it, most specific first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
	pub name: String,
	pub strategies: Vec<Strategy>,
}

impl Target {
	pub fn new(name: impl Into<String>, strategies: Vec<Strategy>) -> Self {
		Self {
			name: name.into(),
			strategies,
		}
	}
}

/// Borrowed page plus the per-interaction time bound.
///
/// Every page call the engine makes goes through a `Locator`, so no single
/// interaction can hang a flow.
pub struct Locator<'a> {
	page: &'a mut dyn PortalPage,
	timeout: Duration,
}

impl<'a> Locator<'a> {
	pub fn new(page: &'a mut dyn PortalPage, timeout: Duration) -> Self {
		Self { page, timeout }
	}

	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	async fn bounded<T>(timeout: Duration, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
		match tokio::time::timeout(timeout, fut).await {
			Ok(result) => result,
			Err(_) => Err(EngineError::timeout(what, timeout)),
		}
	}

	/// First element matched by any of the target's strategies.
	///
	/// A strategy that errors counts as "not found"; the error is only
	/// returned when every strategy errored, since that points at the page
	/// rather than the target.
	pub async fn find(&mut self, target: &Target) -> Result<Option<ElementRef>> {
		let mut last_error = None;
		let mut any_answered = false;
		for strategy in &target.strategies {
			match Self::bounded(self.timeout, &target.name, self.page.query(strategy)).await {
				Ok(Some(element)) => {
					trace!(target = "randevu.locator", name = %target.name, ?strategy, "resolved");
					return Ok(Some(element));
				}
				Ok(None) => any_answered = true,
				Err(err) => {
					debug!(target = "randevu.locator", name = %target.name, ?strategy, error = %err, "strategy failed");
					last_error = Some(err);
				}
			}
		}
		match last_error {
			Some(err) if !any_answered => Err(err),
			_ => Ok(None),
		}
	}

	/// Like [`find`](Self::find) but a miss is a [`EngineError::FormFieldNotFound`].
	pub async fn require(&mut self, target: &Target) -> Result<ElementRef> {
		self.find(target).await?.ok_or_else(|| EngineError::FormFieldNotFound(target.name.clone()))
	}

	/// All elements matched by the first strategy that matches anything.
	pub async fn find_all(&mut self, target: &Target) -> Result<Vec<ElementRef>> {
		for strategy in &target.strategies {
			match Self::bounded(self.timeout, &target.name, self.page.query_all(strategy)).await {
				Ok(found) if !found.is_empty() => return Ok(found),
				Ok(_) => {}
				Err(err) => debug!(target = "randevu.locator", name = %target.name, ?strategy, error = %err, "strategy failed"),
			}
		}
		Ok(Vec::new())
	}

	/// Polls `find` until it resolves or `polls` attempts ran out.
	pub async fn wait_for(&mut self, target: &Target, polls: u32, interval: Duration) -> Result<Option<ElementRef>> {
		for attempt in 0..polls.max(1) {
			if let Some(element) = self.find(target).await? {
				return Ok(Some(element));
			}
			if attempt + 1 < polls {
				tokio::time::sleep(interval).await;
			}
		}
		Ok(None)
	}

	pub async fn click(&mut self, target: &Target) -> Result<()> {
		let element = self.require(target).await?;
		self.click_element(&element, &target.name).await
	}

	pub async fn fill(&mut self, target: &Target, value: &str) -> Result<()> {
		let element = self.require(target).await?;
		self.fill_element(&element, value, &target.name).await
	}

	pub async fn click_element(&mut self, element: &ElementRef, what: &str) -> Result<()> {
		Self::bounded(self.timeout, what, self.page.click(element)).await
	}

	pub async fn fill_element(&mut self, element: &ElementRef, value: &str, what: &str) -> Result<()> {
		Self::bounded(self.timeout, what, self.page.fill(element, value)).await
	}

	pub async fn press_enter(&mut self, element: &ElementRef, what: &str) -> Result<()> {
		Self::bounded(self.timeout, what, self.page.press_enter(element)).await
	}

	pub async fn is_checked(&mut self, element: &ElementRef, what: &str) -> Result<bool> {
		Self::bounded(self.timeout, what, self.page.is_checked(element)).await
	}

	pub async fn input_value(&mut self, element: &ElementRef, what: &str) -> Result<String> {
		Self::bounded(self.timeout, what, self.page.input_value(element)).await
	}

	pub async fn text(&mut self, element: &ElementRef, what: &str) -> Result<String> {
		Self::bounded(self.timeout, what, self.page.text(element)).await
	}

	pub async fn combo_items(&mut self, element: &ElementRef, what: &str) -> Result<Vec<String>> {
		Self::bounded(self.timeout, what, self.page.combo_items(element)).await
	}

	pub async fn choose_combo_item(&mut self, element: &ElementRef, item: &str, what: &str) -> Result<()> {
		Self::bounded(self.timeout, what, self.page.choose_combo_item(element, item)).await
	}

	pub async fn goto(&mut self, url: &str) -> Result<()> {
		Self::bounded(self.timeout, url, self.page.goto(url)).await
	}

	pub async fn dismiss(&mut self) -> Result<()> {
		Self::bounded(self.timeout, "overlay dismissal", self.page.dismiss()).await
	}

	pub async fn captcha(&mut self) -> Result<CaptchaState> {
		Self::bounded(self.timeout, "CAPTCHA state", self.page.captcha()).await
	}

	pub async fn grid_cells(&mut self) -> Result<Vec<GridCell>> {
		Self::bounded(self.timeout, "appointment listing", self.page.grid_cells()).await
	}

	pub async fn body_text(&mut self) -> Result<String> {
		Self::bounded(self.timeout, "page text", self.page.body_text()).await
	}

	pub async fn screenshot(&mut self, path: &Path) -> Result<()> {
		Self::bounded(self.timeout, "screenshot", self.page.screenshot(path)).await
	}

	/// Text of the first element matched by `target`, if any.
	pub async fn read_text(&mut self, target: &Target) -> Result<Option<String>> {
		let Some(element) = self.find(target).await? else {
			return Ok(None);
		};
		let text = self.text(&element, &target.name).await?;
		let text = text.trim();
		Ok((!text.is_empty()).then(|| text.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::page::fake::{PortalScript, ScriptedPortal};

	fn identity_target() -> Target {
		Target::new(
			"identity number field",
			vec![Strategy::label("pasaport"), Strategy::label(r"(t\.?c\.?|tc).*kimlik")],
		)
	}

	#[tokio::test]
	async fn falls_through_strategies_in_order() {
		let mut page = ScriptedPortal::new(PortalScript::default());
		let mut locator = Locator::new(&mut page, Duration::from_secs(1));
		let found = locator.find(&identity_target()).await.unwrap();
		assert!(found.is_some());
	}

	#[tokio::test]
	async fn miss_is_not_an_error_until_required() {
		let mut page = ScriptedPortal::new(PortalScript::default());
		let mut locator = Locator::new(&mut page, Duration::from_secs(1));
		let target = Target::new("passport field", vec![Strategy::label("pasaport")]);
		assert_eq!(locator.find(&target).await.unwrap(), None);
		match locator.require(&target).await {
			Err(EngineError::FormFieldNotFound(name)) => assert_eq!(name, "passport field"),
			other => panic!("unexpected {other:?}"),
		}
	}

	#[tokio::test]
	async fn dead_page_surfaces_the_driver_error() {
		let mut page = ScriptedPortal::new(PortalScript::default());
		page.handle().crash();
		let mut locator = Locator::new(&mut page, Duration::from_secs(1));
		assert!(matches!(locator.find(&identity_target()).await, Err(EngineError::Driver(_))));
	}
}
