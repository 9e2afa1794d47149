// Logging setup

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Trace,
	Debug,
	#[default]
	Info,
	Warn,
	Error,
}

impl fmt::Display for LogLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let level = match self {
			LogLevel::Trace => "trace",
			LogLevel::Debug => "debug",
			LogLevel::Info => "info",
			LogLevel::Warn => "warn",
			LogLevel::Error => "error",
		};
		f.write_str(level)
	}
}

impl FromStr for LogLevel {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"trace" => Ok(LogLevel::Trace),
			"debug" => Ok(LogLevel::Debug),
			"info" => Ok(LogLevel::Info),
			"warn" | "warning" => Ok(LogLevel::Warn),
			"error" => Ok(LogLevel::Error),
			other => Err(format!("unknown log level: {}", other)),
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
	#[default]
	Plain,
	Json,
}

impl FromStr for LogFormat {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"plain" | "text" => Ok(LogFormat::Plain),
			"json" => Ok(LogFormat::Json),
			other => Err(format!("unknown log format: {}", other)),
		}
	}
}

/// Default filter when `RUST_LOG` is unset
fn default_directive(level: LogLevel) -> String {
	format!("warn,metabridge={}", level)
}

/// Install the global subscriber. `RUST_LOG` overrides `level`.
/// Returns an error if a subscriber is already installed.
pub fn init_tracing(level: LogLevel, format: LogFormat) -> Result<(), tracing_subscriber::util::TryInitError> {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

	let registry = tracing_subscriber::registry().with(filter);
	match format {
		LogFormat::Plain => registry
			.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
			.try_init(),
		LogFormat::Json => registry
			.with(
				tracing_subscriber::fmt::layer()
					.json()
					.with_current_span(true)
					.with_writer(std::io::stderr),
			)
			.try_init(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_log_level_parsing() {
		assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
		assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
		assert!("verbose".parse::<LogLevel>().is_err());
		assert_eq!(LogLevel::default(), LogLevel::Info);
	}

	#[test]
	fn test_log_format_parsing() {
		assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
		assert_eq!("plain".parse::<LogFormat>().unwrap(), LogFormat::Plain);
		assert!("xml".parse::<LogFormat>().is_err());
	}

	#[test]
	fn test_default_directive() {
		assert_eq!(default_directive(LogLevel::Trace), "warn,metabridge=trace");
	}
}
