use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use randevu::EngineConfig;
use randevu::config::DEFAULT_TARGET_URL;

#[derive(Parser, Debug)]
#[command(name = "randevu")]
#[command(about = "Appointment portal search and booking service")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = ArgAction::Count)]
	pub verbose: u8,

	/// Patient records file
	#[arg(long, global = true, env = "DATA_FILE", default_value = "data/patients.json", value_name = "FILE")]
	pub data_file: PathBuf,

	/// Monitor records file
	#[arg(long, global = true, env = "MONITORS_FILE", default_value = "data/monitors.json", value_name = "FILE")]
	pub monitors_file: PathBuf,

	#[command(flatten)]
	pub engine: EngineArgs,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Serve the HTTP API and the WebSocket channel
	Serve {
		/// Address to listen on
		#[arg(long, env = "BIND", default_value = "127.0.0.1:8000")]
		bind: String,

		/// Seconds between sweeps for due monitors
		#[arg(long, env = "MONITOR_TICK_SECS", default_value_t = 60)]
		monitor_tick_secs: u64,
	},

	/// Run one search for a stored patient and print the result
	Check(CheckArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
	/// Stored patient to search for
	#[arg(long)]
	pub patient_id: u64,

	/// Appointment category to select (portal default when omitted)
	#[arg(long, default_value = "")]
	pub category: String,

	/// Unit or doctor hint typed into the portal search
	#[arg(long, default_value = "")]
	pub search_text: String,

	/// Date filter: bugun, DD.MM.YYYY or DD.MM.YYYY-DD.MM.YYYY
	#[arg(long)]
	pub date_range: Option<String>,

	/// Time filter: HH:MM-HH:MM, HH:MM- or -HH:MM
	#[arg(long)]
	pub time_range: Option<String>,
}

/// Engine settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
	/// Portal entry point
	#[arg(long, global = true, env = "TARGET_URL", default_value = DEFAULT_TARGET_URL)]
	pub target_url: String,

	/// Run the browser without a window
	#[arg(long, global = true, env = "HEADLESS", default_value = "true", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
	pub headless: bool,

	/// Allow waiting for a human to solve a CAPTCHA (defaults to the opposite of --headless)
	#[arg(long, global = true, env = "INTERACTIVE", value_parser = BoolishValueParser::new())]
	pub interactive: Option<bool>,

	/// Bound for any single page interaction (ms)
	#[arg(long, global = true, env = "PAGE_TIMEOUT_MS", default_value_t = 45_000)]
	pub page_timeout_ms: u64,

	/// Bound for the manual CAPTCHA wait (ms)
	#[arg(long, global = true, env = "RECAPTCHA_TIMEOUT_MS", default_value_t = 180_000)]
	pub recaptcha_timeout_ms: u64,

	/// Extra attempts for the initial portal navigation
	#[arg(long, global = true, env = "NAVIGATION_RETRIES", default_value_t = 2)]
	pub navigation_retries: u32,

	/// Alternative categories scanned beyond the requested one
	#[arg(long, global = true, env = "MAX_ALTERNATIVES", default_value_t = 25)]
	pub max_alternatives: usize,

	/// Minutes an idle session is kept warm
	#[arg(long, global = true, env = "SESSION_IDLE_TIMEOUT_MINUTES", default_value_t = 10)]
	pub session_idle_timeout_minutes: u64,

	/// Directory for the latest screenshot and result
	#[arg(long, global = true, env = "ARTIFACTS_DIR", default_value = "artifacts")]
	pub artifacts_dir: PathBuf,

	/// Root of the per-patient browser profiles
	#[arg(long, global = true, env = "PROFILE_DIR", default_value = ".chrome-profile")]
	pub profile_dir: PathBuf,
}

impl EngineArgs {
	pub fn to_config(&self) -> EngineConfig {
		EngineConfig {
			target_url: self.target_url.clone(),
			headless: self.headless,
			interactive: self.interactive.unwrap_or(!self.headless),
			page_timeout: Duration::from_millis(self.page_timeout_ms),
			captcha_timeout: Duration::from_millis(self.recaptcha_timeout_ms),
			navigation_retries: self.navigation_retries,
			max_alternatives: self.max_alternatives,
			session_idle_timeout: Duration::from_secs(self.session_idle_timeout_minutes * 60),
			artifacts_dir: Some(self.artifacts_dir.clone()),
			profile_dir: self.profile_dir.clone(),
			..EngineConfig::default()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn interactive_follows_headless_unless_set() {
		let cli = Cli::try_parse_from(["randevu", "--headless", "false", "check", "--patient-id", "7"]).unwrap();
		assert!(cli.engine.to_config().interactive);

		let cli = Cli::try_parse_from(["randevu", "--interactive", "no", "serve"]).unwrap();
		let config = cli.engine.to_config();
		assert!(config.headless);
		assert!(!config.interactive);
	}

	#[test]
	fn check_arguments_parse() {
		let cli = Cli::try_parse_from(["randevu", "-vv", "check", "--patient-id", "7", "--category", "Kardiyoloji"]).unwrap();
		assert_eq!(cli.verbose, 2);
		match cli.command {
			Commands::Check(args) => {
				assert_eq!(args.patient_id, 7);
				assert_eq!(args.category, "Kardiyoloji");
				assert_eq!(args.date_range, None);
			}
			other => panic!("unexpected {other:?}"),
		}
	}

	#[test]
	fn timeouts_convert_to_durations() {
		let cli = Cli::try_parse_from(["randevu", "--page-timeout-ms", "1500", "--session-idle-timeout-minutes", "3", "serve"]).unwrap();
		let config = cli.engine.to_config();
		assert_eq!(config.page_timeout, Duration::from_millis(1500));
		assert_eq!(config.session_idle_timeout, Duration::from_secs(180));
	}

	#[test]
	fn serve_takes_a_monitor_sweep_interval() {
		let cli = Cli::try_parse_from(["randevu", "--monitors-file", "/tmp/m.json", "serve", "--monitor-tick-secs", "15"]).unwrap();
		assert_eq!(cli.monitors_file, PathBuf::from("/tmp/m.json"));
		match cli.command {
			Commands::Serve { monitor_tick_secs, .. } => assert_eq!(monitor_tick_secs, 15),
			other => panic!("unexpected {other:?}"),
		}
	}
}
