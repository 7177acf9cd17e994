use tracing_subscriber::EnvFilter;

/// Installs the stderr subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: u8) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		let level = match verbose {
			0 => return EnvFilter::new("warn"),
			1 => "info",
			2 => "debug",
			_ => "trace",
		};
		EnvFilter::new(format!("warn,randevu={level},randevu_cli={level},tower_http={level}"))
	});

	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(verbose > 1)
		.try_init();
}
