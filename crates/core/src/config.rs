//! Engine tunables.

use std::path::PathBuf;
use std::time::Duration;

/// Public entry point of the Hacettepe appointment portal.
pub const DEFAULT_TARGET_URL: &str = "https://hastanerandevu.hacettepe.edu.tr/nucleus-hastaportal-randevu/public/main?user=PUBLIC";

/// Resolved engine settings.
///
/// The CLI fills this from flags and environment variables; tests build it
/// directly, usually through [`EngineConfig::for_tests`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
	/// Portal entry point loaded before login.
	pub target_url: String,
	/// Launch the browser without a visible window.
	pub headless: bool,
	/// Whether a human can complete a CAPTCHA. Unattended runs fail immediately
	/// with `CaptchaTimeout` when one is shown.
	pub interactive: bool,
	/// Upper bound for any single page interaction.
	pub page_timeout: Duration,
	/// Upper bound for the human CAPTCHA wait.
	pub captcha_timeout: Duration,
	pub captcha_poll_interval: Duration,
	/// Additional attempts for the initial navigation.
	pub navigation_retries: u32,
	/// Alternatives scanned beyond the primary category.
	pub max_alternatives: usize,
	/// Idle bound after which a warm session is reaped.
	pub session_idle_timeout: Duration,
	pub reap_interval: Duration,
	/// Polls of the listing (and of overlays) before concluding nothing rendered.
	pub listing_polls: u32,
	pub poll_interval: Duration,
	/// Pause after clicks that trigger a portal round trip.
	pub settle_delay: Duration,
	/// Where `latest.png` and `last-result.json` are written; `None` disables artifacts.
	pub artifacts_dir: Option<PathBuf>,
	/// Root of the per-patient browser profiles.
	pub profile_dir: PathBuf,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			target_url: DEFAULT_TARGET_URL.to_string(),
			headless: true,
			interactive: false,
			page_timeout: Duration::from_millis(45_000),
			captcha_timeout: Duration::from_millis(180_000),
			captcha_poll_interval: Duration::from_secs(1),
			navigation_retries: 2,
			max_alternatives: 25,
			session_idle_timeout: Duration::from_secs(10 * 60),
			reap_interval: Duration::from_secs(30),
			listing_polls: 10,
			poll_interval: Duration::from_millis(500),
			settle_delay: Duration::from_millis(800),
			artifacts_dir: Some(PathBuf::from("artifacts")),
			profile_dir: PathBuf::from(".chrome-profile"),
		}
	}
}

impl EngineConfig {
	/// Settings with every delay collapsed and artifacts disabled.
	pub fn for_tests() -> Self {
		Self {
			target_url: "https://portal.test/main".to_string(),
			page_timeout: Duration::from_secs(2),
			captcha_timeout: Duration::from_millis(200),
			captcha_poll_interval: Duration::from_millis(10),
			listing_polls: 3,
			poll_interval: Duration::from_millis(1),
			settle_delay: Duration::ZERO,
			artifacts_dir: None,
			..Self::default()
		}
	}

	/// Pause after an interaction that triggers a portal round trip.
	pub async fn settle(&self) {
		if !self.settle_delay.is_zero() {
			tokio::time::sleep(self.settle_delay).await;
		}
	}

	pub fn with_target_url(mut self, url: impl Into<String>) -> Self {
		self.target_url = url.into();
		self
	}

	pub fn with_interactive(mut self, interactive: bool) -> Self {
		self.interactive = interactive;
		self
	}

	pub fn with_max_alternatives(mut self, max: usize) -> Self {
		self.max_alternatives = max;
		self
	}

	pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
		self.session_idle_timeout = idle;
		self
	}

	pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.artifacts_dir = Some(dir.into());
		self
	}
}
