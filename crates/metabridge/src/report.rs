// Aggregated load reports
//
// Every per-service outcome (success, failure, or not processed) is data in
// the report. Only catalog unavailability is surfaced as an error.

use std::fmt::Display;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::catalog::ServiceKind;
use crate::error::ServiceError;
use crate::probe::ProbeReport;

/// Serialize a value through its `Display` impl (errors, methods)
pub(crate) fn serialize_display<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
	serializer.collect_str(value)
}

/// Pipeline stage a service failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
	Fetch,
	Compile,
	Connect,
}

/// Result of one invocation (operation or hook)
#[derive(Debug, Clone, Serialize)]
pub struct InvocationOutcome {
	pub name: String,
	#[serde(flatten)]
	pub result: InvocationResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InvocationResult {
	Succeeded { response: Value },
	Failed { error: String },
}

impl InvocationOutcome {
	pub fn from_result<E: Display>(name: impl Into<String>, result: Result<Value, E>) -> Self {
		let result = match result {
			Ok(response) => InvocationResult::Succeeded { response },
			Err(e) => InvocationResult::Failed { error: e.to_string() },
		};
		Self {
			name: name.into(),
			result,
		}
	}

	pub fn is_success(&self) -> bool {
		matches!(self.result, InvocationResult::Succeeded { .. })
	}
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ServiceOutcome {
	/// The pipeline ran to completion (individual probes may still have failed)
	Completed {
		probe: ProbeReport,
		#[serde(skip_serializing_if = "Vec::is_empty")]
		operations: Vec<InvocationOutcome>,
		#[serde(skip_serializing_if = "Vec::is_empty")]
		hooks: Vec<InvocationOutcome>,
	},
	/// A stage failed; later stages did not run
	Failed {
		stage: Stage,
		#[serde(serialize_with = "serialize_display")]
		error: ServiceError,
	},
	/// Cancelled before the pipeline finished
	NotProcessed,
}

#[derive(Debug, Serialize)]
pub struct ServiceReport {
	pub service: String,
	pub kind: ServiceKind,
	#[serde(flatten)]
	pub outcome: ServiceOutcome,
}

impl ServiceReport {
	pub fn probe(&self) -> Option<&ProbeReport> {
		match &self.outcome {
			ServiceOutcome::Completed { probe, .. } => Some(probe),
			_ => None,
		}
	}

	pub fn error(&self) -> Option<&ServiceError> {
		match &self.outcome {
			ServiceOutcome::Failed { error, .. } => Some(error),
			_ => None,
		}
	}

	pub fn is_completed(&self) -> bool {
		matches!(self.outcome, ServiceOutcome::Completed { .. })
	}

	pub fn is_not_processed(&self) -> bool {
		matches!(self.outcome, ServiceOutcome::NotProcessed)
	}
}

/// Best-effort aggregate of one load cycle, in catalog order
#[derive(Debug, Default, Serialize)]
pub struct LoadReport {
	pub services: Vec<ServiceReport>,
	/// Whether the load was cancelled (signal or timeout) before finishing
	pub cancelled: bool,
}

impl LoadReport {
	pub fn get(&self, service: &str) -> Option<&ServiceReport> {
		self.services.iter().find(|s| s.service == service)
	}

	pub fn completed(&self) -> impl Iterator<Item = &ServiceReport> {
		self.services.iter().filter(|s| s.is_completed())
	}

	pub fn failed(&self) -> impl Iterator<Item = &ServiceReport> {
		self.services.iter().filter(|s| s.error().is_some())
	}

	pub fn not_processed(&self) -> impl Iterator<Item = &ServiceReport> {
		self.services.iter().filter(|s| s.is_not_processed())
	}

	pub fn len(&self) -> usize {
		self.services.len()
	}

	pub fn is_empty(&self) -> bool {
		self.services.is_empty()
	}
}
