//! JSON-file patient and monitor records.

mod monitors;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use parking_lot::RwLock;
use randevu::BirthDate;
use randevu::patient::validate_identity;
use randevu_protocol::{Patient, PatientDraft, PatientId, PatientPatch};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CliError, Result};

pub use monitors::MonitorStore;

pub const SCHEMA_VERSION: u32 = 1;

/// Layout of record timestamps, local time.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub(crate) fn timestamp_now() -> String {
	Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreFile {
	schema: u32,
	#[serde(default)]
	next_id: u64,
	#[serde(default)]
	patients: Vec<Patient>,
}

impl Default for StoreFile {
	fn default() -> Self {
		Self {
			schema: SCHEMA_VERSION,
			next_id: 1,
			patients: Vec::new(),
		}
	}
}

/// Older files hold a bare array of patients.
#[derive(Deserialize)]
#[serde(untagged)]
enum OnDisk {
	Versioned(StoreFile),
	Legacy(Vec<Patient>),
}

/// Patient records kept in one JSON file, rewritten on every mutation.
#[derive(Debug)]
pub struct PatientStore {
	path: PathBuf,
	state: RwLock<StoreFile>,
}

impl PatientStore {
	/// Loads `path`, starting empty when the file does not exist yet.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
		let path = path.into();
		let state = if path.exists() {
			let content = read_to_string(&path)?;
			let mut file = match serde_json::from_str::<OnDisk>(&content)? {
				OnDisk::Versioned(file) => file,
				OnDisk::Legacy(patients) => {
					debug!(target = "randevu.store", path = %path.display(), "upgrading bare patient list");
					StoreFile {
						patients,
						..StoreFile::default()
					}
				}
			};
			if file.schema != SCHEMA_VERSION {
				warn!(target = "randevu.store", found = file.schema, expected = SCHEMA_VERSION, "unexpected store schema");
			}
			let highest = file.patients.iter().map(|p| p.id.0).max().unwrap_or(0);
			file.next_id = file.next_id.max(highest + 1);
			file
		} else {
			StoreFile::default()
		};
		info!(target = "randevu.store", path = %path.display(), patients = state.patients.len(), "patient store loaded");
		Ok(Self {
			path,
			state: RwLock::new(state),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn list(&self) -> Vec<Patient> {
		self.state.read().patients.clone()
	}

	pub fn get(&self, id: PatientId) -> Option<Patient> {
		self.state.read().patients.iter().find(|p| p.id == id).cloned()
	}

	/// Like [`get`](Self::get), failing with `PatientNotFound`.
	pub fn require(&self, id: PatientId) -> Result<Patient> {
		self.get(id).ok_or(CliError::PatientNotFound(id))
	}

	pub fn create(&self, draft: PatientDraft) -> Result<Patient> {
		let mut state = self.state.write();
		let patient = Patient {
			id: PatientId(state.next_id),
			name: draft.name.trim().to_string(),
			identity_number: draft.identity_number.trim().to_string(),
			birth_date: draft.birth_date.trim().to_string(),
			phone: normalize_phone(draft.phone),
			created_at: Some(timestamp_now()),
		};
		validate(&patient, &state.patients)?;

		let mut next = state.clone();
		next.patients.push(patient.clone());
		next.next_id += 1;
		self.persist(&next)?;
		*state = next;
		info!(target = "randevu.store", patient = %patient.id, identity = %patient.masked_identity(), "patient created");
		Ok(patient)
	}

	pub fn update(&self, id: PatientId, patch: PatientPatch) -> Result<Patient> {
		let mut state = self.state.write();
		let index = state.patients.iter().position(|p| p.id == id).ok_or(CliError::PatientNotFound(id))?;
		let mut patient = state.patients[index].clone();
		if let Some(name) = patch.name {
			patient.name = name.trim().to_string();
		}
		if let Some(identity) = patch.identity_number {
			patient.identity_number = identity.trim().to_string();
		}
		if let Some(birth) = patch.birth_date {
			patient.birth_date = birth.trim().to_string();
		}
		if patch.phone.is_some() {
			patient.phone = normalize_phone(patch.phone);
		}
		validate(&patient, &state.patients)?;

		let mut next = state.clone();
		next.patients[index] = patient.clone();
		self.persist(&next)?;
		*state = next;
		info!(target = "randevu.store", patient = %id, "patient updated");
		Ok(patient)
	}

	pub fn delete(&self, id: PatientId) -> Result<Patient> {
		let mut state = self.state.write();
		let index = state.patients.iter().position(|p| p.id == id).ok_or(CliError::PatientNotFound(id))?;
		let mut next = state.clone();
		let removed = next.patients.remove(index);
		self.persist(&next)?;
		*state = next;
		info!(target = "randevu.store", patient = %id, "patient deleted");
		Ok(removed)
	}

	fn persist(&self, file: &StoreFile) -> Result<()> {
		write_atomically(&self.path, file)?;
		debug!(target = "randevu.store", path = %self.path.display(), patients = file.patients.len(), "patient store saved");
		Ok(())
	}
}

/// Writes a sibling temp file and renames it over `path`.
fn write_atomically<T: Serialize>(path: &Path, value: &T) -> Result<()> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
	}
	let tmp = path.with_extension("json.tmp");
	let content = serde_json::to_string_pretty(value)?;
	fs::write(&tmp, content).with_context(|| format!("writing {}", tmp.display()))?;
	fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
	Ok(())
}

fn read_to_string(path: &Path) -> Result<String> {
	fs::read_to_string(path).map_err(|source| CliError::Io {
		path: path.to_path_buf(),
		source,
	})
}

fn normalize_phone(phone: Option<String>) -> Option<String> {
	phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty())
}

fn validate(patient: &Patient, existing: &[Patient]) -> Result<()> {
	if patient.name.is_empty() {
		return Err(CliError::InvalidRequest("name must not be empty".to_string()));
	}
	validate_identity(&patient.identity_number).map_err(|err| CliError::InvalidRequest(err.to_string()))?;
	BirthDate::parse(&patient.birth_date).map_err(|err| CliError::InvalidRequest(err.to_string()))?;
	if existing.iter().any(|p| p.id != patient.id && p.identity_number == patient.identity_number) {
		return Err(CliError::InvalidRequest(format!(
			"identity number {} is already registered",
			patient.masked_identity()
		)));
	}
	Ok(())
}
