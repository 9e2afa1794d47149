// Entity probes
//
// Issues one bounded read per discovered entity to confirm it is reachable.
// Probes of one service run with a small concurrency cap; a failing probe is
// recorded and never stops its siblings.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::connector::{Connector, Record};
use crate::error::ProbeError;
use crate::report::serialize_display;
use crate::schema::{CanonicalSchema, DefinitionKind, EntityKind};

pub const SINGLETON_SKIP_REASON: &str = "singleton read semantics undefined";

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProbeOutcome {
	Succeeded {
		records: Vec<Record>,
	},
	Failed {
		#[serde(serialize_with = "serialize_display")]
		error: ProbeError,
	},
	Skipped {
		reason: String,
	},
}

#[derive(Debug, Serialize)]
pub struct EntityProbe {
	pub entity: String,
	pub kind: EntityKind,
	#[serde(flatten)]
	pub outcome: ProbeOutcome,
}

/// Per-entity probe results of one service, in schema order
#[derive(Debug, Serialize)]
pub struct ProbeReport {
	pub service: String,
	pub entities: Vec<EntityProbe>,
}

impl ProbeReport {
	pub fn get(&self, entity: &str) -> Option<&EntityProbe> {
		self.entities.iter().find(|p| p.entity == entity)
	}

	pub fn succeeded(&self) -> impl Iterator<Item = &EntityProbe> {
		self.entities
			.iter()
			.filter(|p| matches!(p.outcome, ProbeOutcome::Succeeded { .. }))
	}

	pub fn failed(&self) -> impl Iterator<Item = &EntityProbe> {
		self.entities
			.iter()
			.filter(|p| matches!(p.outcome, ProbeOutcome::Failed { .. }))
	}

	pub fn skipped(&self) -> impl Iterator<Item = &EntityProbe> {
		self.entities
			.iter()
			.filter(|p| matches!(p.outcome, ProbeOutcome::Skipped { .. }))
	}
}

#[derive(Debug, Clone, Copy)]
pub struct ProbeExecutor {
	concurrency: usize,
	limit: usize,
}

impl Default for ProbeExecutor {
	fn default() -> Self {
		Self {
			concurrency: 2,
			limit: 1,
		}
	}
}

impl ProbeExecutor {
	pub fn new(concurrency: usize, limit: usize) -> Self {
		Self {
			concurrency: concurrency.max(1),
			limit: limit.max(1),
		}
	}

	/// Probe every entity of `schema` through `connector`
	pub async fn probe_all(&self, connector: &Connector, schema: &CanonicalSchema) -> ProbeReport {
		let service = connector.service();
		let entities = stream::iter(schema.each(DefinitionKind::Entity).filter_map(|d| d.as_entity()))
			.map(|entity| async move {
				let name = entity.qualified_name().to_string();
				let outcome = if entity.is_singleton() {
					info!(target: "metabridge", service, entity = %name, "skipping singleton");
					ProbeOutcome::Skipped {
						reason: SINGLETON_SKIP_REASON.to_string(),
					}
				} else {
					match connector.read(&name, self.limit).await {
						Ok(records) => {
							info!(
								target: "metabridge",
								service,
								entity = %name,
								records = records.len(),
								"entity probe succeeded"
							);
							ProbeOutcome::Succeeded { records }
						},
						Err(source) => {
							warn!(target: "metabridge", service, entity = %name, error = %source, "entity probe failed");
							ProbeOutcome::Failed {
								error: ProbeError {
									entity: name.clone(),
									source,
								},
							}
						},
					}
				};
				EntityProbe {
					entity: name,
					kind: entity.kind(),
					outcome,
				}
			})
			.buffered(self.concurrency)
			.collect()
			.await;

		ProbeReport {
			service: service.to_string(),
			entities,
		}
	}
}
