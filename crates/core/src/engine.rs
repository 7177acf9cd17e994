//! Request orchestration: session, login, search, probe, booking.

use std::sync::Arc;
use std::time::Instant;

use randevu_protocol::{BookTarget, OutcomeStatus, Patient, PatientId, SearchOutcome, SearchParams, ServerMessage, Step};
use tracing::{debug, error, info, warn};

use crate::aggregate::{self, Findings};
use crate::artifacts;
use crate::booking;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::filter::SlotFilter;
use crate::page::PageFactory;
use crate::patient::ValidatedPatient;
use crate::portal;
use crate::probe;
use crate::progress::Reporter;
use crate::search;
use crate::session::{self, SessionLease, SessionManager};

/// One unit of work for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
	Search(SearchParams),
	/// Search with `params`, then book `target` if this search discovered it.
	Book { params: SearchParams, target: BookTarget },
}

impl Request {
	pub fn params(&self) -> &SearchParams {
		match self {
			Request::Search(params) | Request::Book { params, .. } => params,
		}
	}

	pub fn patient_id(&self) -> PatientId {
		self.params().patient_id
	}

	fn kind(&self) -> &'static str {
		match self {
			Request::Search(_) => "search",
			Request::Book { .. } => "book",
		}
	}
}

/// Runs requests against patient sessions.
pub struct Engine {
	config: EngineConfig,
	sessions: Arc<SessionManager>,
}

impl Engine {
	pub fn new(config: EngineConfig, factory: Arc<dyn PageFactory>) -> Self {
		let sessions = Arc::new(SessionManager::new(factory, config.session_idle_timeout));
		Self { config, sessions }
	}

	pub fn config(&self) -> &EngineConfig {
		&self.config
	}

	pub fn sessions(&self) -> &Arc<SessionManager> {
		&self.sessions
	}

	/// Runs `request` for `patient` to completion.
	///
	/// Emits status events through `reporter` and then exactly one terminal
	/// message, which is also returned. A cancelled flow ends with a
	/// `CANCELLED` result and its session is kept; a failed flow ends with an
	/// `error` event and its session is kept or discarded according to the
	/// failure.
	pub async fn run(&self, patient: &Patient, request: Request, reporter: Reporter) -> ServerMessage {
		let started = Instant::now();
		info!(target = "randevu.search", patient = %patient.id, kind = request.kind(), "request started");
		let terminal = match self.execute(patient, &request, &reporter).await {
			Ok(outcome) => {
				info!(
					target = "randevu.search",
					patient = %patient.id,
					status = ?outcome.status,
					categories = outcome.alternatives.len(),
					reused = outcome.session_reused,
					elapsed_ms = started.elapsed().as_millis() as u64,
					"request finished"
				);
				ServerMessage::Result { data: Box::new(outcome) }
			}
			Err(EngineError::Cancelled) => {
				info!(target = "randevu.search", patient = %patient.id, "request cancelled before a session was acquired");
				ServerMessage::Result {
					data: Box::new(aggregate::cancelled(false)),
				}
			}
			Err(err) => {
				error!(
					target = "randevu.search",
					patient = %patient.id,
					code = %err.code(),
					error = %err,
					elapsed_ms = started.elapsed().as_millis() as u64,
					"request failed"
				);
				ServerMessage::error(err.code(), err.to_string())
			}
		};
		reporter.finish(terminal.clone());
		terminal
	}

	async fn execute(&self, patient: &Patient, request: &Request, reporter: &Reporter) -> Result<SearchOutcome> {
		let validated = ValidatedPatient::new(patient)?;
		reporter.checkpoint()?;
		reporter.status(Step::Init, format!("{} request for {}", request.kind(), validated.name));

		let mut lease = self.sessions.acquire(patient.id).await?;
		reporter.status(
			Step::Session,
			if lease.is_fresh() { "browser session opened" } else { "existing browser session found" },
		);

		let mut reused = false;
		let flow = self.drive(&mut lease, &validated, request, reporter, &mut reused).await;
		let flow = match flow {
			Err(EngineError::Cancelled) => {
				info!(target = "randevu.search", patient = %patient.id, "request cancelled");
				Ok(aggregate::cancelled(reused))
			}
			other => other,
		};

		if let Some(dir) = &self.config.artifacts_dir {
			let saved = flow.as_ref().ok().filter(|o| o.status != OutcomeStatus::Cancelled);
			let mut locator = lease.locator(self.config.page_timeout);
			artifacts::capture(&mut locator, dir, saved).await;
		}

		match &flow {
			Err(err) if err.discards_session() => {
				warn!(target = "randevu.session", patient = %patient.id, error = %err, "discarding session after fatal error");
				self.sessions.discard(lease).await;
			}
			_ => self.sessions.release(lease),
		}
		flow
	}

	async fn drive(
		&self,
		lease: &mut SessionLease,
		patient: &ValidatedPatient,
		request: &Request,
		reporter: &Reporter,
		reused: &mut bool,
	) -> Result<SearchOutcome> {
		let config = &self.config;

		if lease.is_logged_in() {
			let mut locator = lease.locator(config.page_timeout);
			*reused = locator.find(&portal::logged_in_marker()).await?.is_some();
			if !*reused {
				warn!(target = "randevu.session", patient = %patient.id, "portal login expired; logging in again");
			}
		}
		if *reused {
			debug!(target = "randevu.session", patient = %patient.id, "skipping login");
		} else {
			lease.set_logged_in(false);
			let mut locator = lease.locator(config.page_timeout);
			session::login(&mut locator, patient, config, reporter).await?;
			lease.set_logged_in(true);
		}

		let params = request.params();
		let mut locator = lease.locator(config.page_timeout);
		let reports = search::search(&mut locator, params, config, reporter).await?;
		let filter = SlotFilter::from_params(params);
		let probes = filter.apply(probe::probe(&mut locator, &reports, config, reporter).await?);

		let booking = match request {
			Request::Search(_) => None,
			Request::Book { target, .. } => Some(match booking::locate(target, &reports, &probes, &filter) {
				Some(located) => booking::book(&mut locator, target, &located, config, reporter).await?,
				None => {
					warn!(target = "randevu.booking", date = %target.date, time = %target.effective_time(), "target not among discovered slots");
					reporter.status(Step::Book, "requested slot was not found; nothing booked");
					booking::rejected(target)
				}
			}),
		};

		Ok(Findings {
			reports,
			probes,
			booking,
			session_reused: *reused,
		}
		.into_outcome())
	}
}
