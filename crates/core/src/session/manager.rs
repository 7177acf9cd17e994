//! Session ownership and lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use randevu_protocol::{PatientId, SessionStatus};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::locator::Locator;
use crate::page::{PageFactory, PortalPage};

type PageSlot = Option<Box<dyn PortalPage>>;

#[derive(Debug)]
struct Meta {
	logged_in: bool,
	busy: bool,
	last_activity: Instant,
}

struct Entry {
	page: Arc<AsyncMutex<PageSlot>>,
	meta: Mutex<Meta>,
}

impl Entry {
	fn new() -> Self {
		Self {
			page: Arc::new(AsyncMutex::new(None)),
			meta: Mutex::new(Meta {
				logged_in: false,
				busy: false,
				last_activity: Instant::now(),
			}),
		}
	}
}

/// Clears the busy mark however a lease ends.
struct BusyMark {
	patient: PatientId,
	entry: Arc<Entry>,
	returned: bool,
}

impl Drop for BusyMark {
	fn drop(&mut self) {
		let mut meta = self.entry.meta.lock();
		meta.busy = false;
		if !self.returned {
			meta.logged_in = false;
			meta.last_activity = Instant::now();
			warn!(target = "randevu.session", patient = %self.patient, "lease dropped without release; page lost");
		}
	}
}

/// Exclusive loan of a patient's session for the duration of one flow.
///
/// Hand it back with [`SessionManager::release`] (kept warm) or
/// [`SessionManager::discard`] (destroyed). A lease dropped without either,
/// say by an aborted task, loses its page: the session reads as idle and
/// logged out, and the next `acquire` or reaper sweep replaces it.
pub struct SessionLease {
	patient: PatientId,
	page: Box<dyn PortalPage>,
	guard: OwnedMutexGuard<PageSlot>,
	mark: BusyMark,
	fresh: bool,
}

impl SessionLease {
	pub fn patient(&self) -> PatientId {
		self.patient
	}

	pub fn page(&mut self) -> &mut dyn PortalPage {
		self.page.as_mut()
	}

	/// Locator over this session's page.
	pub fn locator(&mut self, timeout: Duration) -> Locator<'_> {
		Locator::new(self.page.as_mut(), timeout)
	}

	pub fn is_logged_in(&self) -> bool {
		self.mark.entry.meta.lock().logged_in
	}

	pub fn set_logged_in(&self, logged_in: bool) {
		self.mark.entry.meta.lock().logged_in = logged_in;
	}

	/// Whether the page was opened for this lease rather than reused.
	pub fn is_fresh(&self) -> bool {
		self.fresh
	}
}

/// Owns at most one live session per patient and serializes access to it.
///
/// A request for a patient whose session is already lent out fails fast with
/// [`EngineError::SessionBusy`].
pub struct SessionManager {
	factory: Arc<dyn PageFactory>,
	idle_timeout: Duration,
	sessions: Mutex<HashMap<PatientId, Arc<Entry>>>,
}

impl SessionManager {
	pub fn new(factory: Arc<dyn PageFactory>, idle_timeout: Duration) -> Self {
		Self {
			factory,
			idle_timeout,
			sessions: Mutex::new(HashMap::new()),
		}
	}

	pub fn idle_timeout(&self) -> Duration {
		self.idle_timeout
	}

	/// Number of sessions currently tracked.
	pub fn len(&self) -> usize {
		self.sessions.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.lock().is_empty()
	}

	/// Lends out the patient's live session, or a new one marked not logged in.
	///
	/// Sessions whose page died or that sat idle past the bound are closed and
	/// replaced transparently.
	pub async fn acquire(&self, patient: PatientId) -> Result<SessionLease> {
		let (entry, mut guard) = {
			let mut sessions = self.sessions.lock();
			let entry = Arc::clone(sessions.entry(patient).or_insert_with(|| Arc::new(Entry::new())));
			let guard = Arc::clone(&entry.page)
				.try_lock_owned()
				.map_err(|_| EngineError::SessionBusy(patient.to_string()))?;
			(entry, guard)
		};
		let idle_for = {
			let mut meta = entry.meta.lock();
			meta.busy = true;
			meta.last_activity.elapsed()
		};

		let mut existing = guard.take();
		if let Some(page) = existing.as_mut() {
			let expired = idle_for > self.idle_timeout;
			if expired || !page.is_alive().await {
				info!(target = "randevu.session", %patient, expired, "replacing stale session");
				if let Err(err) = page.close().await {
					debug!(target = "randevu.session", %patient, error = %err, "closing stale page failed");
				}
				existing = None;
			}
		}

		let (page, fresh) = match existing {
			Some(page) => {
				debug!(target = "randevu.session", %patient, "reusing session");
				(page, false)
			}
			None => {
				entry.meta.lock().logged_in = false;
				match self.factory.open(patient).await {
					Ok(page) => {
						info!(target = "randevu.session", %patient, "session created");
						(page, true)
					}
					Err(err) => {
						drop(guard);
						self.forget(patient, &entry);
						return Err(err);
					}
				}
			}
		};

		Ok(SessionLease {
			patient,
			page,
			guard,
			mark: BusyMark {
				patient,
				entry,
				returned: false,
			},
			fresh,
		})
	}

	/// Returns a lease and keeps the session warm for reuse.
	pub fn release(&self, lease: SessionLease) {
		let SessionLease {
			patient,
			page,
			mut guard,
			mut mark,
			..
		} = lease;
		*guard = Some(page);
		mark.returned = true;
		let mut meta = mark.entry.meta.lock();
		meta.busy = false;
		meta.last_activity = Instant::now();
		debug!(target = "randevu.session", %patient, logged_in = meta.logged_in, "session released");
	}

	/// Closes a lease's page and forgets the session.
	pub async fn discard(&self, lease: SessionLease) {
		let SessionLease {
			patient,
			mut page,
			guard,
			mut mark,
			..
		} = lease;
		mark.returned = true;
		let entry = Arc::clone(&mark.entry);
		if let Err(err) = page.close().await {
			debug!(target = "randevu.session", %patient, error = %err, "closing discarded page failed");
		}
		{
			let mut meta = entry.meta.lock();
			meta.logged_in = false;
			meta.busy = false;
		}
		drop(guard);
		self.forget(patient, &entry);
		info!(target = "randevu.session", %patient, "session discarded");
	}

	/// Reports `{active, logged_in, idle_seconds}` without touching the session.
	pub fn status(&self, patient: PatientId) -> SessionStatus {
		let Some(entry) = self.sessions.lock().get(&patient).cloned() else {
			return SessionStatus::default();
		};
		let meta = entry.meta.lock();
		SessionStatus {
			active: true,
			logged_in: meta.logged_in,
			idle_seconds: if meta.busy { 0 } else { meta.last_activity.elapsed().as_secs() },
		}
	}

	/// Closes the patient's session. Returns `false` when there was none.
	pub async fn close(&self, patient: PatientId) -> Result<bool> {
		let Some(entry) = self.sessions.lock().get(&patient).cloned() else {
			return Ok(false);
		};
		let mut guard = Arc::clone(&entry.page)
			.try_lock_owned()
			.map_err(|_| EngineError::SessionBusy(patient.to_string()))?;
		self.forget(patient, &entry);
		entry.meta.lock().logged_in = false;
		if let Some(mut page) = guard.take() {
			page.close().await?;
		}
		info!(target = "randevu.session", %patient, "session closed");
		Ok(true)
	}

	/// Closes every session, waiting briefly for in-flight flows to let go.
	pub async fn close_all(&self) {
		let entries: Vec<(PatientId, Arc<Entry>)> = self.sessions.lock().drain().collect();
		for (patient, entry) in entries {
			let lock = Arc::clone(&entry.page).lock_owned();
			match tokio::time::timeout(Duration::from_secs(5), lock).await {
				Ok(mut guard) => {
					if let Some(mut page) = guard.take() {
						if let Err(err) = page.close().await {
							warn!(target = "randevu.session", %patient, error = %err, "closing session failed");
						}
					}
				}
				Err(_) => warn!(target = "randevu.session", %patient, "session still busy at shutdown; abandoning"),
			}
		}
		info!(target = "randevu.session", "all sessions closed");
	}

	/// Closes idle sessions past the idle bound. Busy sessions are never reaped.
	pub async fn reap_idle(&self) -> usize {
		let candidates: Vec<(PatientId, Arc<Entry>)> = self
			.sessions
			.lock()
			.iter()
			.filter(|(_, entry)| {
				let meta = entry.meta.lock();
				!meta.busy && meta.last_activity.elapsed() > self.idle_timeout
			})
			.map(|(id, entry)| (*id, Arc::clone(entry)))
			.collect();

		let mut reaped = 0;
		for (patient, entry) in candidates {
			let Ok(mut guard) = Arc::clone(&entry.page).try_lock_owned() else {
				continue;
			};
			if entry.meta.lock().last_activity.elapsed() <= self.idle_timeout {
				continue;
			}
			self.forget(patient, &entry);
			if let Some(mut page) = guard.take() {
				if let Err(err) = page.close().await {
					debug!(target = "randevu.session", %patient, error = %err, "closing idle page failed");
				}
			}
			info!(target = "randevu.session", %patient, "idle session reaped");
			reaped += 1;
		}
		reaped
	}

	/// Runs [`reap_idle`](Self::reap_idle) every `every` until `shutdown` fires.
	pub fn spawn_reaper(self: &Arc<Self>, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
		let manager = Arc::clone(self);
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(every);
			ticker.tick().await;
			loop {
				tokio::select! {
					_ = shutdown.cancelled() => break,
					_ = ticker.tick() => {
						let reaped = manager.reap_idle().await;
						if reaped > 0 {
							debug!(target = "randevu.session", reaped, remaining = manager.len(), "reaper sweep");
						}
					}
				}
			}
		})
	}

	fn forget(&self, patient: PatientId, entry: &Arc<Entry>) {
		let mut sessions = self.sessions.lock();
		if sessions.get(&patient).is_some_and(|current| Arc::ptr_eq(current, entry)) {
			sessions.remove(&patient);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::page::fake::{Action, PortalScript, ScriptedFactory};

	fn manager(idle: Duration) -> (Arc<ScriptedFactory>, SessionManager) {
		let factory = Arc::new(ScriptedFactory::new(PortalScript::default()));
		let manager = SessionManager::new(factory.clone(), idle);
		(factory, manager)
	}

	#[tokio::test]
	async fn second_acquire_while_lent_out_is_busy() {
		let (_factory, manager) = manager(Duration::from_secs(600));
		let lease = manager.acquire(PatientId(7)).await.unwrap();
		assert!(matches!(manager.acquire(PatientId(7)).await, Err(EngineError::SessionBusy(_))));
		assert!(manager.acquire(PatientId(8)).await.is_ok());
		manager.release(lease);
		assert!(manager.acquire(PatientId(7)).await.is_ok());
	}

	#[tokio::test]
	async fn released_session_is_reused_with_its_login_state() {
		let (factory, manager) = manager(Duration::from_secs(600));
		let lease = manager.acquire(PatientId(7)).await.unwrap();
		assert!(lease.is_fresh());
		lease.set_logged_in(true);
		manager.release(lease);

		let status = manager.status(PatientId(7));
		assert!(status.active && status.logged_in);

		let lease = manager.acquire(PatientId(7)).await.unwrap();
		assert!(!lease.is_fresh());
		assert!(lease.is_logged_in());
		assert_eq!(factory.opened(), 1);
		assert_eq!(manager.status(PatientId(7)).idle_seconds, 0);
	}

	#[tokio::test]
	async fn crashed_page_is_replaced_on_next_acquire() {
		let (factory, manager) = manager(Duration::from_secs(600));
		let lease = manager.acquire(PatientId(7)).await.unwrap();
		lease.set_logged_in(true);
		manager.release(lease);
		factory.last_page().unwrap().crash();

		let lease = manager.acquire(PatientId(7)).await.unwrap();
		assert!(lease.is_fresh());
		assert!(!lease.is_logged_in());
		assert_eq!(factory.opened(), 2);
	}

	#[tokio::test]
	async fn expired_session_is_replaced_and_reaped() {
		let (factory, manager) = manager(Duration::ZERO);
		let lease = manager.acquire(PatientId(7)).await.unwrap();
		manager.release(lease);
		tokio::time::sleep(Duration::from_millis(5)).await;

		assert_eq!(manager.reap_idle().await, 1);
		assert!(manager.is_empty());
		assert!(!manager.status(PatientId(7)).active);
		assert!(factory.journal().contains(&Action::Close));
	}

	#[tokio::test]
	async fn busy_sessions_are_not_reaped_or_closed() {
		let (_factory, manager) = manager(Duration::ZERO);
		let lease = manager.acquire(PatientId(7)).await.unwrap();
		tokio::time::sleep(Duration::from_millis(5)).await;
		assert_eq!(manager.reap_idle().await, 0);
		assert!(matches!(manager.close(PatientId(7)).await, Err(EngineError::SessionBusy(_))));
		manager.release(lease);
	}

	#[tokio::test]
	async fn discard_and_close_forget_the_session() {
		let (_factory, manager) = manager(Duration::from_secs(600));
		let lease = manager.acquire(PatientId(7)).await.unwrap();
		manager.discard(lease).await;
		assert!(!manager.status(PatientId(7)).active);

		let lease = manager.acquire(PatientId(8)).await.unwrap();
		manager.release(lease);
		assert!(manager.close(PatientId(8)).await.unwrap());
		assert!(!manager.close(PatientId(8)).await.unwrap());
		assert!(manager.is_empty());
	}

	#[tokio::test]
	async fn lease_lost_in_a_panicking_task_frees_the_session() {
		let (factory, manager) = manager(Duration::ZERO);
		let lease = manager.acquire(PatientId(7)).await.unwrap();
		lease.set_logged_in(true);
		let task = tokio::spawn(async move {
			let _lease = lease;
			panic!("flow aborted mid-step");
		});
		assert!(task.await.is_err());

		let status = manager.status(PatientId(7));
		assert!(status.active);
		assert!(!status.logged_in);

		tokio::time::sleep(Duration::from_millis(5)).await;
		assert_eq!(manager.reap_idle().await, 1);
		let lease = manager.acquire(PatientId(7)).await.unwrap();
		assert!(lease.is_fresh());
		assert_eq!(factory.opened(), 2);
		manager.release(lease);
	}

	#[tokio::test]
	async fn dropped_lease_allows_a_fresh_acquire() {
		let (factory, manager) = manager(Duration::from_secs(600));
		drop(manager.acquire(PatientId(7)).await.unwrap());
		let lease = manager.acquire(PatientId(7)).await.unwrap();
		assert!(lease.is_fresh());
		assert!(!lease.is_logged_in());
		assert_eq!(factory.opened(), 2);
		manager.release(lease);
	}
}
