// Configuration
//
// One YAML (or JSON) document describes the loader settings, the named
// destinations, the static service catalog and the post-connection hooks.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::debug;

use crate::catalog::{ServiceDescriptor, ServiceKind, StaticCatalog};
use crate::compile::ODataVersion;
use crate::hooks::{HookSpec, PostConnectHook};
use crate::telemetry::LogLevel;
use crate::transport::{Destination, ReqwestTransport};

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("failed to read config: {0}")]
	Io(#[from] std::io::Error),

	#[error("failed to parse config: {0}")]
	Parse(#[from] serde_yaml::Error),

	#[error("invalid duration: {0}")]
	InvalidDuration(String),

	#[error("invalid loader setting: {0}")]
	InvalidSetting(String),

	#[error("service '{service}' references unknown destination '{destination}'")]
	UnknownDestination { service: String, destination: String },

	#[error("duplicate service '{0}'")]
	DuplicateService(String),

	#[error("rest service '{0}' does not declare an openapi document URL")]
	MissingOpenApiUrl(String),

	#[error("hook references unknown service '{0}'")]
	UnknownHookService(String),
}

/// Parse a duration string such as `100ms`, `30s`, `5m`, `1h` or `2d`.
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
	let s = s.trim();
	if s.is_empty() {
		return Err(ConfigError::InvalidDuration("empty duration string".into()));
	}

	const UNITS: [(&str, u64); 5] = [("ms", 0), ("s", 1), ("m", 60), ("h", 60 * 60), ("d", 60 * 60 * 24)];
	let (number, seconds_per_unit) = UNITS
		.iter()
		.find_map(|(suffix, factor)| s.strip_suffix(suffix).map(|n| (n, *factor)))
		.unwrap_or((s, 1));

	let value: u64 = number
		.parse()
		.map_err(|_| ConfigError::InvalidDuration(format!("invalid duration number: {}", s)))?;

	Ok(match seconds_per_unit {
		0 => Duration::from_millis(value),
		factor => Duration::from_secs(value.saturating_mul(factor)),
	})
}

fn deserialize_timeout<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
	D: Deserializer<'de>,
{
	let Some(raw) = Option::<String>::deserialize(deserializer)? else {
		return Ok(None);
	};
	parse_duration(&raw)
		.map(Some)
		.map_err(serde::de::Error::custom)
}

/// Settings of one load cycle
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
	/// Services processed concurrently
	pub workers: usize,
	/// Entity probes in flight per service
	pub probe_concurrency: usize,
	/// Records requested by each probe
	pub probe_limit: usize,
	/// Deadline for the whole load; unfinished services are reported not processed
	#[serde(deserialize_with = "deserialize_timeout")]
	pub timeout: Option<Duration>,
	pub odata_version: ODataVersion,
	pub log_level: LogLevel,
}

impl Default for LoaderConfig {
	fn default() -> Self {
		Self {
			workers: 4,
			probe_concurrency: 2,
			probe_limit: 1,
			timeout: None,
			odata_version: ODataVersion::default(),
			log_level: LogLevel::default(),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
	#[serde(default)]
	pub loader: LoaderConfig,
	#[serde(default)]
	pub destinations: HashMap<String, Destination>,
	#[serde(default)]
	pub services: Vec<ServiceDescriptor>,
	#[serde(default)]
	pub hooks: Vec<HookSpec>,
}

impl Config {
	/// Read and validate a configuration file
	pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let content = fs_err::tokio::read_to_string(path).await?;
		debug!(target: "metabridge", path = %path.display(), "loaded config file");
		Self::parse(&content)
	}

	/// Parse and validate a configuration document
	pub fn parse(content: &str) -> Result<Self, ConfigError> {
		let config: Config = serde_yaml::from_str(content)?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.loader.workers == 0 {
			return Err(ConfigError::InvalidSetting("workers must be at least 1".into()));
		}
		if self.loader.probe_concurrency == 0 {
			return Err(ConfigError::InvalidSetting("probe_concurrency must be at least 1".into()));
		}
		if self.loader.probe_limit == 0 {
			return Err(ConfigError::InvalidSetting("probe_limit must be at least 1".into()));
		}

		let mut seen = HashSet::new();
		for service in &self.services {
			if !seen.insert(service.name.as_str()) {
				return Err(ConfigError::DuplicateService(service.name.clone()));
			}
			if !self.destinations.contains_key(&service.destination) {
				return Err(ConfigError::UnknownDestination {
					service: service.name.clone(),
					destination: service.destination.clone(),
				});
			}
			if service.kind == ServiceKind::Rest && service.openapi.is_none() {
				return Err(ConfigError::MissingOpenApiUrl(service.name.clone()));
			}
		}

		if let Some(service) = self
			.hooks
			.iter()
			.filter_map(HookSpec::service)
			.find(|s| !seen.contains(s))
		{
			return Err(ConfigError::UnknownHookService(service.to_string()));
		}

		Ok(())
	}

	pub fn catalog(&self) -> StaticCatalog {
		StaticCatalog::new(self.services.clone())
	}

	pub fn transport(&self) -> ReqwestTransport {
		ReqwestTransport::new(self.destinations.clone())
	}

	pub fn post_connect_hooks(&self) -> Vec<Arc<dyn PostConnectHook>> {
		self.hooks.iter().cloned().map(HookSpec::into_hook).collect()
	}
}
