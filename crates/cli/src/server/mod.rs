//! HTTP API and WebSocket channel.

mod artifacts;
mod monitors;
mod patients;
mod ws;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::{get, post, put};
use randevu::page::ChromiumFactory;
use randevu::{Engine, EngineConfig};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::Result;
use crate::scheduler::Scheduler;
use crate::store::{MonitorStore, PatientStore};

/// Shared by every handler and connection.
#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<Engine>,
	pub store: Arc<PatientStore>,
	pub scheduler: Arc<Scheduler>,
	shutdown: CancellationToken,
}

impl AppState {
	pub fn new(engine: Arc<Engine>, store: Arc<PatientStore>, monitors: Arc<MonitorStore>) -> Self {
		let shutdown = CancellationToken::new();
		let scheduler = Arc::new(Scheduler::new(Arc::clone(&engine), Arc::clone(&store), monitors, shutdown.clone()));
		Self {
			engine,
			store,
			scheduler,
			shutdown,
		}
	}

	pub fn monitors(&self) -> &Arc<MonitorStore> {
		self.scheduler.monitors()
	}

	/// Fires when the server stops; open connections close on it.
	pub fn shutdown_token(&self) -> &CancellationToken {
		&self.shutdown
	}

	fn artifacts_dir(&self) -> Option<&PathBuf> {
		self.engine.config().artifacts_dir.as_ref()
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/ws", get(ws::ws_handler))
		.route("/api/patients", get(patients::list).post(patients::create))
		.route("/api/patients/{id}", put(patients::update).delete(patients::delete))
		.route("/api/monitors", get(monitors::list).post(monitors::create))
		.route("/api/monitors/{id}", put(monitors::update).delete(monitors::delete))
		.route("/api/monitors/{id}/run", post(monitors::run_now))
		.route("/api/sessions/{patient_id}", get(patients::session_status).delete(patients::close_session))
		.route("/api/screenshot", get(artifacts::latest))
		.route("/api/screenshot/{name}", get(artifacts::named))
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
	Json(json!({
		"status": "ok",
		"sessions": state.engine.sessions().len(),
		"monitors": state.monitors().active().len(),
	}))
}

/// Serves until Ctrl-C, then closes every browser session.
///
/// Stored monitors are swept for due checks every `monitor_tick`.
pub async fn serve(config: EngineConfig, store: PatientStore, monitors: MonitorStore, bind: &str, monitor_tick: Duration) -> Result<()> {
	let factory = Arc::new(ChromiumFactory::new(&config));
	let reap_every = config.reap_interval;
	let engine = Arc::new(Engine::new(config, factory));
	let state = AppState::new(engine, Arc::new(store), Arc::new(monitors));
	let reaper = state.engine.sessions().spawn_reaper(reap_every, state.shutdown.clone());
	let scheduler = state.scheduler.spawn(monitor_tick);

	let listener = TcpListener::bind(bind).await.with_context(|| format!("binding {bind}"))?;
	let addr = listener.local_addr().context("reading bound address")?;
	info!(target = "randevu.server", %addr, patients = state.store.list().len(), monitors = state.monitors().list().len(), "listening");

	let shutdown = state.shutdown.clone();
	axum::serve(listener, router(state.clone()))
		.with_graceful_shutdown(async move {
			match tokio::signal::ctrl_c().await {
				Ok(()) => info!(target = "randevu.server", "shutdown requested"),
				Err(err) => warn!(target = "randevu.server", error = %err, "cannot listen for Ctrl-C"),
			}
			shutdown.cancel();
		})
		.await
		.context("server failed")?;

	state.shutdown.cancel();
	if let Err(err) = reaper.await {
		warn!(target = "randevu.server", error = %err, "session reaper ended abnormally");
	}
	if let Err(err) = scheduler.await {
		warn!(target = "randevu.server", error = %err, "monitor scheduler ended abnormally");
	}
	state.engine.sessions().close_all().await;
	info!(target = "randevu.server", "stopped");
	Ok(())
}
