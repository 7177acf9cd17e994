//! Process surface for the randevu engine: configuration, logging, the
//! record stores, the monitor scheduler, the HTTP/WebSocket server and the
//! `check` command.

pub mod check;
pub mod cli;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod server;
pub mod store;

use std::time::Duration;

use cli::{Cli, Commands};
use error::Result;
use store::{MonitorStore, PatientStore};

/// Runs the parsed command and returns the process exit code.
pub async fn run(cli: Cli) -> Result<i32> {
	let config = cli.engine.to_config();
	let store = PatientStore::open(&cli.data_file)?;
	match cli.command {
		Commands::Serve { bind, monitor_tick_secs } => {
			let monitors = MonitorStore::open(&cli.monitors_file)?;
			server::serve(config, store, monitors, &bind, Duration::from_secs(monitor_tick_secs.max(1))).await?;
			Ok(0)
		}
		Commands::Check(args) => check::run_check(config, &store, &args).await,
	}
}
