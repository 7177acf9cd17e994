//! [`PortalPage`] over the Chrome DevTools Protocol.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use randevu_protocol::PatientId;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{CaptchaState, CellState, ElementRef, GridCell, PageFactory, PortalPage, Strategy, scripts};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

fn driver(err: impl std::fmt::Display) -> EngineError {
	EngineError::Driver(err.to_string())
}

/// Launches one Chromium per patient, each with its own profile directory.
#[derive(Debug, Clone)]
pub struct ChromiumFactory {
	headless: bool,
	profile_root: PathBuf,
	request_timeout: Duration,
}

impl ChromiumFactory {
	pub fn new(config: &EngineConfig) -> Self {
		Self {
			headless: config.headless,
			profile_root: config.profile_dir.clone(),
			request_timeout: config.page_timeout,
		}
	}

	fn profile_dir(&self, patient: PatientId) -> PathBuf {
		self.profile_root.join(format!("patient_{patient}"))
	}
}

#[async_trait]
impl PageFactory for ChromiumFactory {
	async fn open(&self, patient: PatientId) -> Result<Box<dyn PortalPage>> {
		let profile = self.profile_dir(patient);
		std::fs::create_dir_all(&profile).map_err(|source| EngineError::Io {
			path: profile.clone(),
			source,
		})?;

		let mut builder = BrowserConfig::builder()
			.user_data_dir(&profile)
			.request_timeout(self.request_timeout)
			.window_size(1366, 900)
			.arg("--lang=tr-TR")
			.arg("--disable-blink-features=AutomationControlled");
		if !self.headless {
			builder = builder.with_head();
		}
		let config = builder.build().map_err(driver)?;

		info!(target = "randevu.session", patient = %patient, profile = %profile.display(), headless = self.headless, "launching chromium");
		let (browser, mut handler) = Browser::launch(config).await.map_err(driver)?;
		let events = tokio::spawn(async move {
			while let Some(event) = handler.next().await {
				if let Err(err) = event {
					debug!(target = "randevu.session", error = %err, "cdp handler stopped");
					break;
				}
			}
		});

		let page = match browser.new_page("about:blank").await {
			Ok(page) => page,
			Err(err) => {
				events.abort();
				return Err(driver(err));
			}
		};

		Ok(Box::new(ChromiumPage {
			browser: Some(browser),
			page,
			events,
		}))
	}
}

/// One Chromium instance driving a single tab.
pub struct ChromiumPage {
	browser: Option<Browser>,
	page: Page,
	events: JoinHandle<()>,
}

#[derive(Deserialize)]
struct RawCell {
	date: String,
	time: String,
	cue: String,
}

impl ChromiumPage {
	async fn eval<T: DeserializeOwned>(&self, js: String) -> Result<T> {
		let params = EvaluateParams::builder()
			.expression(js)
			.await_promise(true)
			.return_by_value(true)
			.build()
			.map_err(driver)?;
		let result = self.page.evaluate_expression(params).await.map_err(driver)?;
		result.into_value::<T>().map_err(driver)
	}

	async fn eval_flag(&self, js: String, failure: impl FnOnce() -> String) -> Result<()> {
		interaction_outcome(self.eval::<bool>(js).await?, failure)
	}
}

/// A script that ran but found nothing to act on is a page-level miss, not a
/// broken browser.
fn interaction_outcome(done: bool, failure: impl FnOnce() -> String) -> Result<()> {
	if done { Ok(()) } else { Err(EngineError::FormFieldNotFound(failure())) }
}

#[async_trait]
impl PortalPage for ChromiumPage {
	async fn goto(&mut self, url: &str) -> Result<()> {
		self.page.goto(url).await.map_err(|err| EngineError::NavigationFailure {
			url: url.to_string(),
			reason: err.to_string(),
		})?;
		Ok(())
	}

	async fn current_url(&mut self) -> Result<String> {
		Ok(self.page.url().await.map_err(driver)?.unwrap_or_default())
	}

	async fn query(&mut self, strategy: &Strategy) -> Result<Option<ElementRef>> {
		Ok(self.query_all(strategy).await?.into_iter().next())
	}

	async fn query_all(&mut self, strategy: &Strategy) -> Result<Vec<ElementRef>> {
		let refs: Vec<String> = self.eval(scripts::query_all(strategy)).await?;
		Ok(refs.into_iter().map(ElementRef).collect())
	}

	async fn click(&mut self, element: &ElementRef) -> Result<()> {
		self.eval_flag(scripts::click(&element.0), || format!("click on {} failed", element.0)).await
	}

	async fn fill(&mut self, element: &ElementRef, value: &str) -> Result<()> {
		self.eval_flag(scripts::fill(&element.0, value), || format!("fill of {} failed", element.0)).await
	}

	async fn press_enter(&mut self, element: &ElementRef) -> Result<()> {
		self.eval_flag(scripts::press_enter(&element.0), || format!("enter on {} failed", element.0))
			.await
	}

	async fn is_checked(&mut self, element: &ElementRef) -> Result<bool> {
		self.eval(scripts::is_checked(&element.0)).await
	}

	async fn input_value(&mut self, element: &ElementRef) -> Result<String> {
		self.eval(scripts::input_value(&element.0)).await
	}

	async fn text(&mut self, element: &ElementRef) -> Result<String> {
		self.eval(scripts::text(&element.0)).await
	}

	async fn combo_items(&mut self, element: &ElementRef) -> Result<Vec<String>> {
		self.eval(scripts::combo_items(&element.0)).await
	}

	async fn choose_combo_item(&mut self, element: &ElementRef, item: &str) -> Result<()> {
		self.eval_flag(scripts::choose_combo_item(&element.0, item), || {
			format!("'{item}' is not an option of {}", element.0)
		})
		.await
	}

	async fn dismiss(&mut self) -> Result<()> {
		self.eval::<bool>(scripts::DISMISS.to_string()).await.map(|_| ())
	}

	async fn captcha(&mut self) -> Result<CaptchaState> {
		let state: String = self.eval(scripts::captcha()).await?;
		Ok(match state.as_str() {
			"solved" => CaptchaState::Solved,
			"pending" => CaptchaState::Pending,
			_ => CaptchaState::Absent,
		})
	}

	async fn grid_cells(&mut self) -> Result<Vec<GridCell>> {
		let raw: Vec<RawCell> = self.eval(scripts::grid_cells()).await?;
		Ok(raw
			.into_iter()
			.map(|cell| GridCell::new(cell.date, cell.time, CellState::from_cue(&cell.cue)))
			.collect())
	}

	async fn body_text(&mut self) -> Result<String> {
		self.eval(scripts::body_text()).await
	}

	async fn screenshot(&mut self, path: &Path) -> Result<()> {
		let params = ScreenshotParams::builder().full_page(true).build();
		self.page.save_screenshot(params, path).await.map_err(driver)?;
		Ok(())
	}

	async fn is_alive(&mut self) -> bool {
		if self.browser.is_none() || self.events.is_finished() {
			return false;
		}
		self.page.url().await.is_ok()
	}

	async fn close(&mut self) -> Result<()> {
		if let Err(err) = self.page.clone().close().await {
			debug!(target = "randevu.session", error = %err, "page close failed");
		}
		if let Some(mut browser) = self.browser.take() {
			if let Err(err) = browser.close().await {
				warn!(target = "randevu.session", error = %err, "browser close failed");
			}
			if let Err(err) = browser.wait().await {
				warn!(target = "randevu.session", error = %err, "browser did not exit cleanly");
			}
		}
		self.events.abort();
		Ok(())
	}
}

impl Drop for ChromiumPage {
	fn drop(&mut self) {
		self.events.abort();
	}
}
