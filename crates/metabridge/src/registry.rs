// Connector registry
//
// One cached connector per service name. The outer map lock is only held to
// find a service's slot; creation and connection run under that slot's async
// lock, so concurrent callers for the same service share one connect while
// different services never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::catalog::ServiceKind;
use crate::compile::ODataVersion;
use crate::connector::{Connector, ConnectorKind, Credentials};
use crate::error::ConnectorError;
use crate::schema::CanonicalSchema;
use crate::transport::HttpTransport;

type Slot = Arc<tokio::sync::Mutex<Option<Arc<Connector>>>>;

/// Cache of live connectors, keyed by service name
pub struct ConnectorRegistry {
	transport: Arc<dyn HttpTransport>,
	odata_version: ODataVersion,
	slots: Mutex<HashMap<String, Slot>>,
}

impl std::fmt::Debug for ConnectorRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ConnectorRegistry")
			.field("odata_version", &self.odata_version)
			.field("services", &self.service_names())
			.finish()
	}
}

impl ConnectorRegistry {
	pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
		Self {
			transport,
			odata_version: ODataVersion::default(),
			slots: Mutex::new(HashMap::new()),
		}
	}

	pub fn with_odata_version(mut self, version: ODataVersion) -> Self {
		self.odata_version = version;
		self
	}

	fn slot(&self, service: &str) -> Slot {
		self.slots
			.lock()
			.entry(service.to_string())
			.or_default()
			.clone()
	}

	/// Return the cached connector for `service` if it is still usable and
	/// bound to the same kind, credentials and (structurally) the same schema.
	/// Otherwise the stale connector is invalidated and replaced by a fresh one.
	pub async fn get_or_create(
		&self,
		service: &str,
		kind: ServiceKind,
		schema: Arc<CanonicalSchema>,
		credentials: Credentials,
	) -> Result<Arc<Connector>, ConnectorError> {
		loop {
			let slot = self.slot(service);
			let mut cached = slot.lock().await;

			// The slot may have been dropped by `invalidate`/`clear` while we waited
			let current = self
				.slots
				.lock()
				.get(service)
				.is_some_and(|s| Arc::ptr_eq(s, &slot));
			if !current {
				continue;
			}

			if let Some(existing) = cached.as_ref() {
				if Self::reusable(existing, kind, &schema, &credentials) {
					debug!(target: "metabridge", service, "reusing cached connector");
					return Ok(existing.clone());
				}
				debug!(
					target: "metabridge",
					service,
					state = %existing.state(),
					"evicting stale connector"
				);
				existing.invalidate();
				*cached = None;
			}

			let connector = Connector::new(
				service,
				ConnectorKind::for_service(kind, self.odata_version),
				credentials.clone(),
				self.transport.clone(),
			)
			.bind_metadata(schema.clone())?;
			let connector = Arc::new(connector);

			// Cached before connecting so a failed connector is evicted on the next call
			*cached = Some(connector.clone());
			connector.connect().await?;

			info!(target: "metabridge", service, %kind, "connector created");
			return Ok(connector);
		}
	}

	fn reusable(existing: &Connector, kind: ServiceKind, schema: &Arc<CanonicalSchema>, credentials: &Credentials) -> bool {
		if !existing.is_usable() {
			return false;
		}
		if existing.kind().service_kind() != kind || existing.credentials() != credentials {
			return false;
		}
		existing
			.schema()
			.is_some_and(|bound| Arc::ptr_eq(bound, schema) || bound.as_ref() == schema.as_ref())
	}

	/// Cached connector for `service`, if any (usable or not)
	pub async fn get(&self, service: &str) -> Option<Arc<Connector>> {
		let slot = self.slots.lock().get(service).cloned()?;
		let cached = slot.lock().await;
		cached.clone()
	}

	/// Invalidate and drop the cached connector. Returns whether one existed.
	pub async fn invalidate(&self, service: &str) -> bool {
		let Some(slot) = self.slots.lock().remove(service) else {
			return false;
		};
		let mut cached = slot.lock().await;
		match cached.take() {
			Some(connector) => {
				connector.invalidate();
				info!(target: "metabridge", service, "connector invalidated");
				true
			},
			None => false,
		}
	}

	/// Invalidate every cached connector
	pub async fn clear(&self) {
		let slots: Vec<_> = self.slots.lock().drain().map(|(_, slot)| slot).collect();
		for slot in slots {
			if let Some(connector) = slot.lock().await.take() {
				connector.invalidate();
			}
		}
	}

	/// Names of services with a slot, sorted
	pub fn service_names(&self) -> Vec<String> {
		let mut names: Vec<_> = self.slots.lock().keys().cloned().collect();
		names.sort();
		names
	}

	pub fn len(&self) -> usize {
		self.slots.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.slots.lock().is_empty()
	}
}
