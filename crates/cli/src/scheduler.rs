//! Background runner for stored monitors.
//!
//! A sweep starts every due, active monitor on its own task. A check runs
//! one search through the engine; `auto_book` monitors then book the latest
//! sub-time that passed their filters and stop once a booking succeeds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use parking_lot::Mutex;
use randevu::{Engine, Reporter, Request};
use randevu_protocol::{BookTarget, BookingResult, Monitor, MonitorAction, OutcomeStatus, Patient, ProbedBucket, SearchOutcome, ServerMessage};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::store::{MonitorStore, PatientStore, TIMESTAMP_FORMAT};

/// How one check ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
	/// The monitor was paused or removed before the check began.
	Skipped,
	/// The patient no longer exists; the monitor was deactivated.
	PatientMissing,
	/// The search ran and nothing was booked.
	Searched { status: OutcomeStatus, found: Vec<ProbedBucket> },
	/// A booking was attempted.
	Booked(BookingResult),
	/// The engine reported an error.
	Failed(String),
}

/// Whether `monitor` should run at `now`.
///
/// Never-checked monitors and unreadable stamps are due immediately.
pub fn is_due(monitor: &Monitor, now: NaiveDateTime) -> bool {
	let Some(stamp) = monitor.last_checked.as_deref() else {
		return true;
	};
	match NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT) {
		Ok(last) => now.signed_duration_since(last).num_seconds() >= i64::from(monitor.interval_minutes) * 60,
		Err(_) => true,
	}
}

/// The sub-time an automatic booking goes for: the last one of the last bucket.
pub fn latest_target(found: &[ProbedBucket]) -> Option<BookTarget> {
	let bucket = found.iter().rev().find(|b| !b.subtimes.is_empty())?;
	let subtime = bucket.subtimes.last()?;
	Some(BookTarget {
		date: bucket.date.clone(),
		hour: bucket.hour.clone(),
		subtime: Some(subtime.clone()),
	})
}

fn describe(found: &[ProbedBucket]) -> String {
	found
		.iter()
		.map(|b| format!("{} {}: {}", b.date, b.hour, b.subtimes.join(", ")))
		.collect::<Vec<_>>()
		.join("; ")
}

pub struct Scheduler {
	engine: Arc<Engine>,
	patients: Arc<PatientStore>,
	monitors: Arc<MonitorStore>,
	shutdown: CancellationToken,
	running: Mutex<HashMap<u64, CancellationToken>>,
}

/// Releases a monitor's running slot when its task ends, however it ends.
struct Claim<'a> {
	scheduler: &'a Scheduler,
	id: u64,
}

impl Drop for Claim<'_> {
	fn drop(&mut self) {
		self.scheduler.running.lock().remove(&self.id);
	}
}

impl Scheduler {
	pub fn new(engine: Arc<Engine>, patients: Arc<PatientStore>, monitors: Arc<MonitorStore>, shutdown: CancellationToken) -> Self {
		Self {
			engine,
			patients,
			monitors,
			shutdown,
			running: Mutex::new(HashMap::new()),
		}
	}

	pub fn monitors(&self) -> &Arc<MonitorStore> {
		&self.monitors
	}

	pub fn is_running(&self, id: u64) -> bool {
		self.running.lock().contains_key(&id)
	}

	/// Starts a check of monitor `id` unless one is already running.
	pub fn start(self: &Arc<Self>, id: u64) -> Option<JoinHandle<CheckOutcome>> {
		let cancel = {
			let mut running = self.running.lock();
			if running.contains_key(&id) {
				debug!(target = "randevu.monitor", monitor = id, "check already running");
				return None;
			}
			let token = self.shutdown.child_token();
			running.insert(id, token.clone());
			token
		};
		let scheduler = Arc::clone(self);
		Some(tokio::spawn(async move {
			let _claim = Claim {
				scheduler: &scheduler,
				id,
			};
			scheduler.check(id, &cancel).await
		}))
	}

	/// Cancels the running check of monitor `id`, if any.
	pub fn cancel(&self, id: u64) -> bool {
		match self.running.lock().get(&id) {
			Some(token) => {
				info!(target = "randevu.monitor", monitor = id, "cancelling running check");
				token.cancel();
				true
			}
			None => false,
		}
	}

	/// Starts every active monitor that is due at `now`.
	pub fn run_due(self: &Arc<Self>, now: NaiveDateTime) -> Vec<JoinHandle<CheckOutcome>> {
		self.monitors
			.active()
			.into_iter()
			.filter(|monitor| is_due(monitor, now))
			.filter_map(|monitor| self.start(monitor.id))
			.collect()
	}

	/// Sweeps for due monitors every `every` until shutdown.
	pub fn spawn(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
		let scheduler = Arc::clone(self);
		tokio::spawn(async move {
			info!(target = "randevu.monitor", every_secs = every.as_secs(), "scheduler started");
			let mut ticker = tokio::time::interval(every);
			loop {
				tokio::select! {
					_ = scheduler.shutdown.cancelled() => break,
					_ = ticker.tick() => {
						let started = scheduler.run_due(Local::now().naive_local());
						if !started.is_empty() {
							debug!(target = "randevu.monitor", started = started.len(), "sweep started checks");
						}
					}
				}
			}
			info!(target = "randevu.monitor", "scheduler stopped");
		})
	}

	async fn check(&self, id: u64, cancel: &CancellationToken) -> CheckOutcome {
		let Some(monitor) = self.monitors.get(id).filter(|m| m.is_active) else {
			debug!(target = "randevu.monitor", monitor = id, "monitor inactive or removed; skipping");
			return CheckOutcome::Skipped;
		};
		let Some(patient) = self.patients.get(monitor.patient_id) else {
			warn!(target = "randevu.monitor", monitor = id, patient = %monitor.patient_id, "patient missing; deactivating monitor");
			self.note(id, OutcomeStatus::Error, format!("patient {} no longer exists", monitor.patient_id), true);
			return CheckOutcome::PatientMissing;
		};
		if let Err(err) = self.monitors.mark_checked(id) {
			debug!(target = "randevu.monitor", monitor = id, error = %err, "monitor vanished before its check");
			return CheckOutcome::Skipped;
		}
		info!(
			target = "randevu.monitor",
			monitor = id,
			patient = %patient.id,
			search = %monitor.search_text,
			category = %monitor.randevu_type,
			"check started"
		);

		let outcome = match self.run(&patient, Request::Search(monitor.params()), cancel).await {
			Ok(outcome) => outcome,
			Err(message) => {
				self.note(id, OutcomeStatus::Error, message.clone(), false);
				return CheckOutcome::Failed(message);
			}
		};
		let status = outcome.status;
		let found: Vec<ProbedBucket> = outcome
			.probed_subtimes
			.into_iter()
			.flat_map(|probe| probe.buckets)
			.filter(|bucket| !bucket.subtimes.is_empty())
			.collect();

		if status != OutcomeStatus::Available || outcome.total_available == 0 {
			info!(target = "randevu.monitor", monitor = id, ?status, "nothing open");
			let message = if status == OutcomeStatus::Cancelled { "check cancelled" } else { "no open slots" };
			self.note(id, status, message, false);
			return CheckOutcome::Searched { status, found };
		}

		match monitor.action_type {
			MonitorAction::Notify => {
				let message = if found.is_empty() {
					format!("{} open slots", outcome.total_available)
				} else {
					describe(&found)
				};
				info!(target = "randevu.monitor", monitor = id, patient = %patient.id, open = %message, "open slots found");
				self.note(id, status, message, false);
				CheckOutcome::Searched { status, found }
			}
			MonitorAction::AutoBook => match latest_target(&found) {
				Some(target) => self.book(&monitor, &patient, target, cancel).await,
				None => {
					info!(target = "randevu.monitor", monitor = id, "no sub-time passes the filters; not booking");
					self.note(id, status, "no sub-time passes the filters", false);
					CheckOutcome::Searched { status, found }
				}
			},
		}
	}

	async fn book(&self, monitor: &Monitor, patient: &Patient, target: BookTarget, cancel: &CancellationToken) -> CheckOutcome {
		info!(
			target = "randevu.monitor",
			monitor = monitor.id,
			patient = %patient.id,
			date = %target.date,
			time = %target.effective_time(),
			"booking automatically"
		);
		let request = Request::Book {
			params: monitor.params(),
			target,
		};
		let outcome = match self.run(patient, request, cancel).await {
			Ok(outcome) => outcome,
			Err(message) => {
				self.note(monitor.id, OutcomeStatus::Error, message.clone(), false);
				return CheckOutcome::Failed(message);
			}
		};
		let Some(booking) = outcome.booking else {
			let message = if outcome.status == OutcomeStatus::Cancelled { "booking cancelled" } else { "booking produced no result" };
			self.note(monitor.id, outcome.status, message, false);
			return CheckOutcome::Failed(message.to_string());
		};

		let verb = if booking.success { "booked" } else { "booking failed for" };
		let summary = format!("{verb} {} {}: {}", booking.target.date, booking.target.effective_time(), booking.message);
		if booking.success {
			info!(target = "randevu.monitor", monitor = monitor.id, patient = %patient.id, "{summary}");
		} else {
			warn!(target = "randevu.monitor", monitor = monitor.id, patient = %patient.id, "{summary}");
		}
		self.note(monitor.id, outcome.status, summary, booking.success);
		CheckOutcome::Booked(booking)
	}

	/// Runs one request to its terminal message, logging progress at trace level.
	async fn run(&self, patient: &Patient, request: Request, cancel: &CancellationToken) -> Result<SearchOutcome, String> {
		let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
		let reporter = Reporter::new(tx, cancel.clone());
		let drain = async {
			while let Some(msg) = events.recv().await {
				if let ServerMessage::Status { step, message } = msg {
					trace!(target = "randevu.monitor", patient = %patient.id, %step, "{message}");
				}
			}
		};
		let (terminal, ()) = futures::join!(self.engine.run(patient, request, reporter), drain);
		match terminal {
			ServerMessage::Result { data } => Ok(*data),
			ServerMessage::Error { message, .. } => Err(message),
			other => Err(format!("unexpected terminal message: {other:?}")),
		}
	}

	fn note(&self, id: u64, status: OutcomeStatus, message: impl Into<String>, deactivate: bool) {
		if let Err(err) = self.monitors.record(id, status, message, deactivate) {
			debug!(target = "randevu.monitor", monitor = id, error = %err, "check result not recorded");
		}
	}
}
