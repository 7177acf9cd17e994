//! Screenshot files written by the engine.

use std::path::Path as FsPath;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use randevu::artifacts::LATEST_SCREENSHOT;

use super::AppState;
use crate::error::{CliError, Result};

pub(super) async fn latest(State(state): State<AppState>) -> Result<impl IntoResponse> {
	serve_png(&state, LATEST_SCREENSHOT).await
}

pub(super) async fn named(State(state): State<AppState>, Path(name): Path<String>) -> Result<impl IntoResponse> {
	check_name(&name)?;
	serve_png(&state, &name).await
}

/// Only plain `.png` file names inside the artifacts directory are served.
fn check_name(name: &str) -> Result<()> {
	if name.contains("..") || name.contains('/') || name.contains('\\') || !name.ends_with(".png") {
		return Err(CliError::InvalidRequest(format!("'{name}' is not a screenshot name")));
	}
	Ok(())
}

async fn serve_png(state: &AppState, name: &str) -> Result<impl IntoResponse + use<>> {
	let dir = state.artifacts_dir().ok_or_else(|| CliError::NotFound("artifacts directory".to_string()))?;
	let path = dir.join(name);
	let bytes = read(&path).await?.ok_or_else(|| CliError::NotFound(format!("screenshot {name}")))?;
	Ok(([(header::CONTENT_TYPE, "image/png"), (header::CACHE_CONTROL, "no-store")], bytes))
}

async fn read(path: &FsPath) -> Result<Option<Vec<u8>>> {
	match tokio::fs::read(path).await {
		Ok(bytes) => Ok(Some(bytes)),
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(source) => Err(CliError::Io {
			path: path.to_path_buf(),
			source,
		}),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_plain_png_names_pass() {
		assert!(check_name("latest.png").is_ok());
		assert!(check_name("../secret.png").is_err());
		assert!(check_name("a/b.png").is_err());
		assert!(check_name("a\\b.png").is_err());
		assert!(check_name("last-result.json").is_err());
	}
}
