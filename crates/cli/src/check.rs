//! One search from the command line.

use std::sync::Arc;

use randevu::page::ChromiumFactory;
use randevu::{Engine, EngineConfig, Reporter, Request};
use randevu_protocol::{OutcomeStatus, PatientId, SearchParams, ServerMessage};
use tracing::{info, warn};

use crate::cli::CheckArgs;
use crate::error::Result;
use crate::store::PatientStore;

/// Runs one search and prints its terminal message as JSON on stdout.
///
/// Returns the process exit code for the outcome. Ctrl-C cancels the
/// search between steps.
pub async fn run_check(config: EngineConfig, store: &PatientStore, args: &CheckArgs) -> Result<i32> {
	let patient = store.require(PatientId(args.patient_id))?;
	let factory = Arc::new(ChromiumFactory::new(&config));
	let engine = Engine::new(config, factory);

	let params = SearchParams {
		patient_id: patient.id,
		search_text: args.search_text.clone(),
		randevu_type: args.category.clone(),
		date_range: args.date_range.clone(),
		time_range: args.time_range.clone(),
	};
	let (reporter, mut events) = Reporter::channel();
	let cancel = reporter.cancel_token().clone();
	let interrupt = tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			warn!(target = "randevu.search", "interrupted; cancelling");
			cancel.cancel();
		}
	});

	let print_progress = async {
		while let Some(msg) = events.recv().await {
			if let ServerMessage::Status { step, message } = msg {
				info!(target = "randevu.progress", %step, "{message}");
			}
		}
	};
	let (terminal, ()) = futures::join!(engine.run(&patient, Request::Search(params), reporter), print_progress);
	interrupt.abort();

	println!("{}", serde_json::to_string_pretty(&terminal)?);
	engine.sessions().close_all().await;
	Ok(exit_code(&terminal))
}

/// 0 available, 2 not available, 3 unknown, 1 for errors and cancellation.
pub fn exit_code(terminal: &ServerMessage) -> i32 {
	match terminal {
		ServerMessage::Result { data } => match data.status {
			OutcomeStatus::Available => 0,
			OutcomeStatus::NotAvailable => 2,
			OutcomeStatus::Unknown => 3,
			OutcomeStatus::Error | OutcomeStatus::Cancelled => 1,
		},
		_ => 1,
	}
}

#[cfg(test)]
mod tests {
	use randevu_protocol::{ErrorCode, SearchOutcome};

	use super::*;

	fn result(status: OutcomeStatus) -> ServerMessage {
		ServerMessage::Result {
			data: Box::new(SearchOutcome::bare(status)),
		}
	}

	#[test]
	fn exit_codes_follow_outcome_status() {
		assert_eq!(exit_code(&result(OutcomeStatus::Available)), 0);
		assert_eq!(exit_code(&result(OutcomeStatus::NotAvailable)), 2);
		assert_eq!(exit_code(&result(OutcomeStatus::Unknown)), 3);
		assert_eq!(exit_code(&result(OutcomeStatus::Cancelled)), 1);
		assert_eq!(exit_code(&ServerMessage::error(ErrorCode::CaptchaTimeout, "unattended")), 1);
	}
}
