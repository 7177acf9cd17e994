//! Step events and cooperative cancellation for one request.

use randevu_protocol::{ServerMessage, Step};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{EngineError, Result};

/// Progress sink and cancellation flag for one request.
///
/// Stages call [`status`](Self::status) after each named transition and
/// [`checkpoint`](Self::checkpoint) between steps. The terminal message is
/// only sent through [`finish`](Self::finish), which consumes the reporter,
/// so a request can never emit two terminal events.
#[derive(Debug)]
pub struct Reporter {
	tx: mpsc::UnboundedSender<ServerMessage>,
	cancel: CancellationToken,
}

impl Reporter {
	pub fn new(tx: mpsc::UnboundedSender<ServerMessage>, cancel: CancellationToken) -> Self {
		Self { tx, cancel }
	}

	/// Reporter with a fresh token and its receiving end.
	pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self::new(tx, CancellationToken::new()), rx)
	}

	pub fn cancel_token(&self) -> &CancellationToken {
		&self.cancel
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Emits a step event. Silently dropped once cancellation was requested.
	pub fn status(&self, step: Step, message: impl Into<String>) {
		if self.cancel.is_cancelled() {
			return;
		}
		let message = message.into();
		trace!(target = "randevu.progress", %step, %message, "status");
		let _ = self.tx.send(ServerMessage::status(step, message));
	}

	/// Fails with [`EngineError::Cancelled`] once cancellation was requested.
	pub fn checkpoint(&self) -> Result<()> {
		if self.cancel.is_cancelled() {
			debug!(target = "randevu.progress", "cancellation observed");
			Err(EngineError::Cancelled)
		} else {
			Ok(())
		}
	}

	/// Sends the terminal message for this request.
	pub fn finish(self, message: ServerMessage) {
		debug_assert!(message.is_terminal());
		if self.tx.send(message).is_err() {
			debug!(target = "randevu.progress", "terminal message dropped; receiver gone");
		}
	}
}
