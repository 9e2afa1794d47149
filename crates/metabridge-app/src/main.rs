// metabridge command line entry point
//
// Loads every active service of the configured catalog once and prints the
// aggregated load report as JSON on stdout. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use metabridge::telemetry::{LogFormat, LogLevel, init_tracing};
use metabridge::{Config, ServiceLoader, parse_duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to the configuration file (YAML or JSON)
	#[arg(short, long, default_value = "metabridge.yaml")]
	config: PathBuf,

	/// Services processed concurrently (overrides config file)
	#[arg(long)]
	workers: Option<usize>,

	/// Deadline for the whole load, e.g. `30s` or `2m` (overrides config file)
	#[arg(long, value_parser = parse_timeout)]
	timeout: Option<Duration>,

	/// Log level (overrides config file; RUST_LOG takes precedence)
	#[arg(long)]
	log_level: Option<LogLevel>,

	/// Log output format: plain or json
	#[arg(long, default_value = "plain")]
	log_format: LogFormat,

	/// Pretty-print the report
	#[arg(long)]
	pretty: bool,
}

fn parse_timeout(s: &str) -> Result<Duration, String> {
	parse_duration(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	let mut config = Config::load(&args.config)
		.await
		.with_context(|| format!("loading {}", args.config.display()))?;

	// Apply CLI overrides
	if let Some(workers) = args.workers {
		anyhow::ensure!(workers > 0, "--workers must be at least 1");
		config.loader.workers = workers;
	}
	if let Some(timeout) = args.timeout {
		config.loader.timeout = Some(timeout);
	}
	if let Some(level) = args.log_level {
		config.loader.log_level = level;
	}

	init_tracing(config.loader.log_level, args.log_format).context("installing log subscriber")?;

	let loader = ServiceLoader::builder(Arc::new(config.catalog()), Arc::new(config.transport()))
		.config(config.loader.clone())
		.hooks(config.post_connect_hooks())
		.build();

	let cancel = CancellationToken::new();
	let signal = {
		let cancel = cancel.clone();
		tokio::spawn(async move {
			match tokio::signal::ctrl_c().await {
				Ok(()) => {
					info!(target: "metabridge", "interrupt received, cancelling load");
					cancel.cancel();
				},
				Err(e) => warn!(target: "metabridge", error = %e, "failed to listen for interrupt"),
			}
		})
	};

	let report = loader.load_services_with_cancel(cancel).await?;
	signal.abort();

	let output = if args.pretty {
		serde_json::to_string_pretty(&report)?
	} else {
		serde_json::to_string(&report)?
	};
	println!("{}", output);
	Ok(())
}
