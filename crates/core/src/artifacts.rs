//! Last-screenshot and last-result files written after each request.

use std::path::{Path, PathBuf};

use randevu_protocol::SearchOutcome;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::locator::Locator;

pub const LATEST_SCREENSHOT: &str = "latest.png";
pub const LAST_RESULT: &str = "last-result.json";

/// Saves a full-page screenshot and, when given, the outcome as JSON.
///
/// Best effort: failures are logged and swallowed.
pub async fn capture(locator: &mut Locator<'_>, dir: &Path, outcome: Option<&SearchOutcome>) {
	if let Err(err) = tokio::fs::create_dir_all(dir).await {
		warn!(target = "randevu.session", dir = %dir.display(), error = %err, "cannot create artifacts directory");
		return;
	}
	let shot = dir.join(LATEST_SCREENSHOT);
	match locator.screenshot(&shot).await {
		Ok(()) => debug!(target = "randevu.session", path = %shot.display(), "screenshot saved"),
		Err(err) => warn!(target = "randevu.session", path = %shot.display(), error = %err, "screenshot failed"),
	}
	if let Some(outcome) = outcome {
		if let Err(err) = write_result(dir, outcome).await {
			warn!(target = "randevu.session", error = %err, "result not saved");
		}
	}
}

async fn write_result(dir: &Path, outcome: &SearchOutcome) -> Result<PathBuf> {
	let path = dir.join(LAST_RESULT);
	let json = serde_json::to_vec_pretty(outcome)?;
	tokio::fs::write(&path, json).await.map_err(|source| EngineError::Io { path: path.clone(), source })?;
	Ok(path)
}
