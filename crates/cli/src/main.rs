use clap::Parser;
use randevu_cli::cli::Cli;
use randevu_cli::logging;
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose.max(1));

	match randevu_cli::run(cli).await {
		Ok(code) => std::process::exit(code),
		Err(err) => {
			error!(target = "randevu", code = %err.code(), error = %err, "command failed");
			std::process::exit(1);
		}
	}
}
