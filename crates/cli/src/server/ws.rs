//! The persistent client channel.
//!
//! One connection runs at most one search/book flow at a time. Frames are
//! handled in arrival order; flow progress is forwarded from a spawned task
//! through the same outgoing queue, so `cancel` and `ping` stay responsive
//! while a flow runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use randevu::{Reporter, Request};
use randevu_protocol::{ClientMessage, ErrorCode, Patient, PatientId, SearchParams, ServerMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::AppState;

pub(super) async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
	ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
	let (sender, mut receiver) = socket.split();
	let (out, out_rx) = mpsc::unbounded_channel();
	let writer = tokio::spawn(write_loop(sender, out_rx));
	let shutdown = state.shutdown_token().clone();
	info!(target = "randevu.ws", "client connected");

	let mut conn = Connection { state, out, flow: None };
	loop {
		let frame = tokio::select! {
			_ = shutdown.cancelled() => break,
			frame = receiver.next() => frame,
		};
		match frame {
			Some(Ok(Message::Text(text))) => conn.handle_text(text.as_str()).await,
			Some(Ok(Message::Close(_))) | None => break,
			Some(Ok(_)) => {}
			Some(Err(err)) => {
				debug!(target = "randevu.ws", error = %err, "receive failed");
				break;
			}
		}
	}

	conn.close().await;
	drop(conn);
	if let Err(err) = writer.await {
		debug!(target = "randevu.ws", error = %err, "writer task ended abnormally");
	}
	info!(target = "randevu.ws", "client disconnected");
}

async fn write_loop(mut sender: SplitSink<WebSocket, Message>, mut rx: mpsc::UnboundedReceiver<ServerMessage>) {
	while let Some(msg) = rx.recv().await {
		let json = match serde_json::to_string(&msg) {
			Ok(json) => json,
			Err(err) => {
				warn!(target = "randevu.ws", error = %err, "unserializable message dropped");
				continue;
			}
		};
		if sender.send(Message::Text(json.into())).await.is_err() {
			debug!(target = "randevu.ws", "client gone; dropping outgoing messages");
			break;
		}
	}
	let _ = sender.close().await;
}

/// A running flow and the means to stop it.
struct Flow {
	patient: PatientId,
	cancel: CancellationToken,
	in_flight: Arc<AtomicBool>,
	handle: JoinHandle<()>,
}

impl Flow {
	fn is_running(&self) -> bool {
		self.in_flight.load(Ordering::SeqCst)
	}
}

struct Connection {
	state: AppState,
	out: mpsc::UnboundedSender<ServerMessage>,
	flow: Option<Flow>,
}

impl Connection {
	fn send(&self, msg: ServerMessage) {
		let _ = self.out.send(msg);
	}

	async fn handle_text(&mut self, text: &str) {
		let msg = match serde_json::from_str::<ClientMessage>(text) {
			Ok(msg) => msg,
			Err(err) => {
				debug!(target = "randevu.ws", error = %err, "malformed message");
				self.send(ServerMessage::error(ErrorCode::InvalidRequest, format!("malformed message: {err}")));
				return;
			}
		};

		match msg {
			ClientMessage::Ping => self.send(ServerMessage::Pong),
			ClientMessage::Cancel => self.cancel(),
			ClientMessage::SessionStatus { patient_id } => self.send(ServerMessage::SessionStatus {
				data: self.state.engine.sessions().status(patient_id),
			}),
			ClientMessage::CloseSession { patient_id } => self.close_session(patient_id),
			ClientMessage::Search(params) => self.begin(Request::Search(params)),
			ClientMessage::Book { params, book_target } => self.begin(Request::Book {
				params,
				target: book_target,
			}),
		}
	}

	fn cancel(&self) {
		match &self.flow {
			Some(flow) if flow.is_running() => {
				info!(target = "randevu.ws", patient = %flow.patient, "cancel requested");
				flow.cancel.cancel();
			}
			_ => debug!(target = "randevu.ws", "cancel with nothing in flight"),
		}
	}

	/// Closes the patient's page off the read loop; a slow browser teardown
	/// must not hold up `ping` or `cancel`.
	fn close_session(&self, patient_id: PatientId) {
		let engine = Arc::clone(&self.state.engine);
		let out = self.out.clone();
		tokio::spawn(async move {
			let reply = match engine.sessions().close(patient_id).await {
				Ok(closed) => {
					debug!(target = "randevu.ws", patient = %patient_id, closed, "close_session handled");
					ServerMessage::SessionClosed { patient_id: Some(patient_id) }
				}
				Err(err) => ServerMessage::error(err.code(), err.to_string()),
			};
			let _ = out.send(reply);
		});
	}

	fn begin(&mut self, request: Request) {
		if let Some(flow) = self.flow.as_ref().filter(|f| f.is_running()) {
			warn!(target = "randevu.ws", running = %flow.patient, requested = %request.patient_id(), "request while another is in flight");
			self.send(ServerMessage::error(
				ErrorCode::RequestInFlight,
				"a request is already running on this connection; cancel it or wait for its result",
			));
			return;
		}
		let Some(patient) = self.state.store.get(request.patient_id()) else {
			self.send(ServerMessage::error(
				ErrorCode::PatientNotFound,
				format!("patient {} not found", request.patient_id()),
			));
			return;
		};
		self.flow = Some(spawn_flow(&self.state, patient, request, self.out.clone()));
	}

	/// Cancels any running flow and waits for it to let go of its session.
	async fn close(&mut self) {
		let Some(flow) = self.flow.take() else {
			return;
		};
		if flow.is_running() {
			info!(target = "randevu.ws", patient = %flow.patient, "connection closed; cancelling flow");
			flow.cancel.cancel();
		}
		if let Err(err) = flow.handle.await {
			warn!(target = "randevu.ws", error = %err, "flow task ended abnormally");
		}
	}
}

/// Runs `request` on its own task, forwarding its events to `out`.
///
/// The terminal event is followed by the patient's session status. The
/// flow stops counting as in flight just before its terminal event goes out.
fn spawn_flow(state: &AppState, patient: Patient, request: Request, out: mpsc::UnboundedSender<ServerMessage>) -> Flow {
	let (reporter, mut events) = Reporter::channel();
	let cancel = reporter.cancel_token().clone();
	let in_flight = Arc::new(AtomicBool::new(true));
	let engine = Arc::clone(&state.engine);
	let running = Arc::clone(&in_flight);
	let patient_id = patient.id;
	log_request(request.params());

	let handle = tokio::spawn(async move {
		let forward = async {
			while let Some(msg) = events.recv().await {
				if !msg.is_terminal() {
					let _ = out.send(msg);
					continue;
				}
				running.store(false, Ordering::SeqCst);
				let _ = out.send(msg);
				let _ = out.send(ServerMessage::SessionStatus {
					data: engine.sessions().status(patient_id),
				});
			}
		};
		futures::join!(engine.run(&patient, request, reporter), forward);
		running.store(false, Ordering::SeqCst);
	});

	Flow {
		patient: patient_id,
		cancel,
		in_flight,
		handle,
	}
}

fn log_request(params: &SearchParams) {
	info!(
		target = "randevu.ws",
		patient = %params.patient_id,
		category = %params.randevu_type,
		search_text = %params.search_text,
		"request accepted"
	);
}
