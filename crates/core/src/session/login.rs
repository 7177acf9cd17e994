//! Portal login: navigation, identity form, CAPTCHA wait, verification.

use randevu_protocol::Step;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::locator::{Locator, Target};
use crate::page::CaptchaState;
use crate::patient::ValidatedPatient;
use crate::portal;
use crate::progress::Reporter;

/// Logs `patient` in on the page behind `locator`.
///
/// Runs navigation, identity and birth-date entry, consent, the CAPTCHA
/// wait, submit, and verification, emitting a step event after each. Login
/// failures are returned to the caller and never retried.
pub async fn login(locator: &mut Locator<'_>, patient: &ValidatedPatient, config: &EngineConfig, reporter: &Reporter) -> Result<()> {
	info!(target = "randevu.login", patient = %patient.id, identity = %patient.masked_identity(), "login start");
	reporter.status(Step::LoginStart, format!("opening portal for {}", patient.name));
	navigate(locator, &config.target_url, config).await?;

	if locator.find(&portal::logged_in_marker()).await?.is_some() {
		info!(target = "randevu.login", patient = %patient.id, "portal session already authenticated");
		reporter.status(Step::LoggedIn, "already logged in");
		return Ok(());
	}
	if locator.wait_for(&portal::identity_field(), config.listing_polls, config.poll_interval).await?.is_none() {
		return Err(EngineError::FormFieldNotFound(portal::identity_field().name));
	}

	reporter.checkpoint()?;
	locator.fill(&portal::identity_field(), &patient.identity).await?;
	reporter.status(Step::FillIdentity, format!("identity number entered ({})", patient.masked_identity()));

	reporter.checkpoint()?;
	fill_birth_date(locator, patient, config, reporter).await?;

	reporter.checkpoint()?;
	ensure_consent(locator, config).await?;
	reporter.status(Step::Consent, "consent checkbox checked");

	reporter.checkpoint()?;
	await_captcha(locator, config, reporter).await?;

	reporter.checkpoint()?;
	locator.click(&portal::submit_button()).await?;
	config.settle().await;
	reporter.status(Step::Submit, "login form submitted");

	verify(locator, patient, config, reporter).await?;
	info!(target = "randevu.login", patient = %patient.id, "login complete");
	reporter.status(Step::LoggedIn, "logged in");
	Ok(())
}

/// Loads `url`, retrying a bounded number of times on failure.
pub async fn navigate(locator: &mut Locator<'_>, url: &str, config: &EngineConfig) -> Result<()> {
	let attempts = config.navigation_retries + 1;
	let mut reason = String::new();
	for attempt in 1..=attempts {
		match locator.goto(url).await {
			Ok(()) => {
				config.settle().await;
				return Ok(());
			}
			Err(err) => {
				warn!(target = "randevu.login", %url, attempt, attempts, error = %err, "navigation failed");
				reason = err.to_string();
				if attempt < attempts {
					tokio::time::sleep(config.poll_interval * attempt).await;
				}
			}
		}
	}
	Err(EngineError::NavigationFailure { url: url.to_string(), reason })
}

/// Fills the single birth-date field, or commits the year/month/day
/// selectors with one step event per selector.
async fn fill_birth_date(locator: &mut Locator<'_>, patient: &ValidatedPatient, config: &EngineConfig, reporter: &Reporter) -> Result<()> {
	let birth = &patient.birth;
	if let Some(field) = locator.find(&portal::birth_date_field()).await? {
		let value = birth.formatted();
		locator.fill_element(&field, &value, "birth date field").await?;
		reporter.status(Step::FillBirthDate, format!("birth date entered as {value}"));
		return Ok(());
	}

	debug!(target = "randevu.login", "no combined birth-date field; using selectors");
	let selectors = [
		("year", portal::birth_year_combo(), birth.year_candidates()),
		("month", portal::birth_month_combo(), birth.month_candidates()),
		("day", portal::birth_day_combo(), birth.day_candidates()),
	];
	for (part, target, candidates) in selectors {
		reporter.checkpoint()?;
		let committed = commit_combo(locator, &target, &candidates, config).await?;
		reporter.status(Step::FillBirthDate, format!("birth {part} selected: {committed}"));
	}
	Ok(())
}

/// Chooses the first candidate the selector accepts and reads it back.
///
/// A candidate only counts once the selector reports exactly that value;
/// when no candidate survives the read-back the field counts as not found.
async fn commit_combo(locator: &mut Locator<'_>, target: &Target, candidates: &[String], config: &EngineConfig) -> Result<String> {
	let combo = locator.require(target).await?;
	let mut last_read = String::new();
	for candidate in candidates {
		if let Err(err) = locator.choose_combo_item(&combo, candidate, &target.name).await {
			debug!(target = "randevu.login", field = %target.name, %candidate, error = %err, "option not accepted");
			continue;
		}
		config.settle().await;
		let read = locator.input_value(&combo, &target.name).await?;
		if read.trim().to_lowercase() == candidate.trim().to_lowercase() {
			debug!(target = "randevu.login", field = %target.name, value = %read, "committed");
			return Ok(read.trim().to_string());
		}
		warn!(target = "randevu.login", field = %target.name, expected = %candidate, read = %read, "read-back mismatch");
		last_read = read;
	}
	Err(EngineError::FormFieldNotFound(format!(
		"{} (read back '{}', expected one of {})",
		target.name,
		last_read.trim(),
		candidates.join(", ")
	)))
}

async fn ensure_consent(locator: &mut Locator<'_>, config: &EngineConfig) -> Result<()> {
	let target = portal::consent_checkbox();
	let checkbox = locator.require(&target).await?;
	if locator.is_checked(&checkbox, &target.name).await? {
		return Ok(());
	}
	locator.click_element(&checkbox, &target.name).await?;
	config.settle().await;
	if locator.is_checked(&checkbox, &target.name).await? {
		Ok(())
	} else {
		Err(EngineError::FormFieldNotFound(format!("{} (did not stay checked)", target.name)))
	}
}

/// Waits for a shown CAPTCHA to be completed by a human.
///
/// Unattended runs fail at once; interactive runs poll until the separately
/// configured CAPTCHA timeout.
async fn await_captcha(locator: &mut Locator<'_>, config: &EngineConfig, reporter: &Reporter) -> Result<()> {
	if locator.captcha().await? != CaptchaState::Pending {
		return Ok(());
	}
	reporter.status(Step::Captcha, "CAPTCHA detected; complete it in the browser window");
	if !config.interactive {
		warn!(target = "randevu.login", "CAPTCHA shown in unattended mode");
		return Err(EngineError::CaptchaTimeout("unattended mode cannot complete a CAPTCHA".to_string()));
	}

	let deadline = Instant::now() + config.captcha_timeout;
	loop {
		tokio::time::sleep(config.captcha_poll_interval).await;
		reporter.checkpoint()?;
		if locator.captcha().await? != CaptchaState::Pending {
			info!(target = "randevu.login", "CAPTCHA completed");
			reporter.status(Step::Captcha, "CAPTCHA completed");
			return Ok(());
		}
		if Instant::now() >= deadline {
			return Err(EngineError::CaptchaTimeout(format!("no completion within {}ms", config.captcha_timeout.as_millis())));
		}
	}
}

/// Confirms the portal accepted the login, completing the information dialog if shown.
async fn verify(locator: &mut Locator<'_>, patient: &ValidatedPatient, config: &EngineConfig, reporter: &Reporter) -> Result<()> {
	for attempt in 0..config.listing_polls.max(1) {
		if locator.find(&portal::info_dialog()).await?.is_some() {
			return complete_info_dialog(locator, patient, config, reporter).await;
		}
		if locator.find(&portal::logged_in_marker()).await?.is_some() {
			return Ok(());
		}
		if attempt + 1 < config.listing_polls {
			tokio::time::sleep(config.poll_interval).await;
		}
	}
	let message = locator
		.read_text(&portal::notification())
		.await?
		.unwrap_or_else(|| "login form still displayed after submit".to_string());
	warn!(target = "randevu.login", patient = %patient.id, %message, "login rejected");
	Err(EngineError::LoginRejected(message))
}

async fn complete_info_dialog(locator: &mut Locator<'_>, patient: &ValidatedPatient, config: &EngineConfig, reporter: &Reporter) -> Result<()> {
	if let Some(phone) = &patient.phone {
		match locator.find(&portal::info_phone_field()).await? {
			Some(field) => locator.fill_element(&field, phone, "information dialog phone field").await?,
			None => warn!(target = "randevu.login", "information dialog has no phone field"),
		}
	}
	match locator.find(&portal::info_confirm_button()).await? {
		Some(button) => locator.click_element(&button, "information dialog confirm button").await?,
		None => {
			warn!(target = "randevu.login", "information dialog has no confirm button; dismissing");
			locator.dismiss().await?;
		}
	}
	config.settle().await;
	reporter.status(Step::InfoDialog, "information dialog confirmed");
	Ok(())
}
