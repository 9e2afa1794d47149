// Connectors
//
// A connector binds one compiled schema to one service's credentials and
// drives generic read/create/invoke through it. The request shapes of each
// protocol live in `odata` and `rest`; this module owns the lifecycle:
//
//   Created -> MetadataBound -> Connected -> Ready
//                    \______________\_________> Failed
//
// `Failed` is terminal. An invalidated connector rejects every operation.

mod odata;
mod rest;

pub use odata::ODataOperations;
pub use rest::RestOperations;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use percent_encoding::{AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::ServiceKind;
use crate::compile::ODataVersion;
use crate::error::ConnectorError;
use crate::schema::{CanonicalSchema, EntityDescriptor, OperationDescriptor};
use crate::transport::{HttpRequest, HttpTransport};

/// A single record read from or written to a service
pub type Record = Value;

/// Named invocation parameters
pub type Params = serde_json::Map<String, Value>;

/// Longest error body kept on a `ConnectorError::Status`
const MAX_ERROR_BODY: usize = 500;

/// Characters escaped inside a single URL path segment
pub(crate) const PATH_SEGMENT: &AsciiSet = &CONTROLS
	.add(b' ')
	.add(b'"')
	.add(b'#')
	.add(b'%')
	.add(b'/')
	.add(b'<')
	.add(b'>')
	.add(b'?')
	.add(b'`')
	.add(b'{')
	.add(b'}');

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectorState {
	Created,
	MetadataBound,
	Connected,
	Ready,
	Failed,
}

impl fmt::Display for ConnectorState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ConnectorState::Created => "created",
			ConnectorState::MetadataBound => "metadata-bound",
			ConnectorState::Connected => "connected",
			ConnectorState::Ready => "ready",
			ConnectorState::Failed => "failed",
		};
		f.write_str(name)
	}
}

/// Destination and service root a connector talks to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Credentials {
	pub destination: String,
	/// Service root path relative to the destination
	pub path: String,
}

/// Everything a protocol implementation needs to issue one request
#[derive(Clone, Copy)]
pub struct RequestContext<'a> {
	pub transport: &'a dyn HttpTransport,
	pub credentials: &'a Credentials,
	pub schema: &'a CanonicalSchema,
}

impl<'a> RequestContext<'a> {
	pub fn entity(&self, name: &str) -> Result<&'a EntityDescriptor, ConnectorError> {
		self.schema
			.entity(name)
			.ok_or_else(|| ConnectorError::EntityNotFound(name.to_string()))
	}

	/// Send a request to the service's destination and decode the JSON body.
	/// An empty 2xx body decodes to `Value::Null`.
	pub async fn send_json(&self, request: HttpRequest) -> Result<Value, ConnectorError> {
		let url = request.url.clone();
		debug!(
			target: "metabridge",
			service = %self.schema.service(),
			method = %request.method,
			%url,
			"sending request"
		);

		let response = self
			.transport
			.send(&self.credentials.destination, request)
			.await?;
		if !response.is_success() {
			return Err(ConnectorError::Status {
				url,
				status: response.status,
				body: response.body.chars().take(MAX_ERROR_BODY).collect(),
			});
		}
		if response.body.trim().is_empty() {
			return Ok(Value::Null);
		}
		serde_json::from_str(&response.body).map_err(|e| ConnectorError::decode(url, e.to_string()))
	}
}

/// Protocol-specific request shapes
#[async_trait]
pub trait ServiceOperations: Send + Sync {
	/// Read at most `limit` records of an entity
	async fn read(&self, ctx: RequestContext<'_>, entity: &str, limit: usize) -> Result<Vec<Record>, ConnectorError>;

	async fn create(&self, ctx: RequestContext<'_>, entity: &str, payload: Record) -> Result<Record, ConnectorError>;

	async fn invoke(
		&self,
		ctx: RequestContext<'_>,
		operation: &OperationDescriptor,
		params: &Params,
	) -> Result<Value, ConnectorError>;
}

/// Protocol variant of a connector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorKind {
	OData(ODataOperations),
	Rest(RestOperations),
}

impl ConnectorKind {
	pub fn for_service(kind: ServiceKind, odata_version: ODataVersion) -> Self {
		match kind {
			ServiceKind::OData => ConnectorKind::OData(ODataOperations::new(odata_version)),
			ServiceKind::Rest => ConnectorKind::Rest(RestOperations),
		}
	}

	pub fn service_kind(&self) -> ServiceKind {
		match self {
			ConnectorKind::OData(_) => ServiceKind::OData,
			ConnectorKind::Rest(_) => ServiceKind::Rest,
		}
	}

	pub fn supports_create(&self) -> bool {
		matches!(self, ConnectorKind::OData(_))
	}

	fn operations(&self) -> &dyn ServiceOperations {
		match self {
			ConnectorKind::OData(ops) => ops,
			ConnectorKind::Rest(ops) => ops,
		}
	}
}

/// Service root with a guaranteed trailing slash
pub(crate) fn service_root(path: &str) -> String {
	if path.ends_with('/') {
		path.to_string()
	} else {
		format!("{}/", path)
	}
}

/// Runtime handle for one service
pub struct Connector {
	service: String,
	kind: ConnectorKind,
	credentials: Credentials,
	transport: Arc<dyn HttpTransport>,
	schema: Option<Arc<CanonicalSchema>>,
	state: Mutex<ConnectorState>,
	invalidated: AtomicBool,
}

impl fmt::Debug for Connector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connector")
			.field("service", &self.service)
			.field("kind", &self.kind)
			.field("credentials", &self.credentials)
			.field("state", &self.state())
			.field("invalidated", &self.is_invalidated())
			.finish()
	}
}

impl Connector {
	pub fn new(
		service: impl Into<String>,
		kind: ConnectorKind,
		credentials: Credentials,
		transport: Arc<dyn HttpTransport>,
	) -> Self {
		Self {
			service: service.into(),
			kind,
			credentials,
			transport,
			schema: None,
			state: Mutex::new(ConnectorState::Created),
			invalidated: AtomicBool::new(false),
		}
	}

	/// Bind the compiled schema. Only valid in `Created`; the schema must
	/// come from a document of the connector's protocol.
	pub fn bind_metadata(mut self, schema: Arc<CanonicalSchema>) -> Result<Self, ConnectorError> {
		let state = self.state();
		if state != ConnectorState::Created {
			return Err(ConnectorError::NotConnected {
				service: self.service,
				state,
			});
		}
		if schema.protocol() != self.kind.service_kind() {
			return Err(ConnectorError::SchemaMismatch {
				service: self.service,
				kind: self.kind.service_kind(),
				schema: schema.protocol(),
			});
		}
		self.schema = Some(schema);
		*self.state.get_mut() = ConnectorState::MetadataBound;
		Ok(self)
	}

	/// Establish the session to the destination
	pub async fn connect(&self) -> Result<(), ConnectorError> {
		let state = self.state();
		if state != ConnectorState::MetadataBound {
			return Err(ConnectorError::NotConnected {
				service: self.service.clone(),
				state,
			});
		}

		match self.transport.connect(&self.credentials.destination).await {
			Ok(()) => {
				*self.state.lock() = ConnectorState::Connected;
				debug!(
					target: "metabridge",
					service = %self.service,
					destination = %self.credentials.destination,
					"connector connected"
				);
				Ok(())
			},
			Err(source) => {
				*self.state.lock() = ConnectorState::Failed;
				warn!(
					target: "metabridge",
					service = %self.service,
					destination = %self.credentials.destination,
					error = %source,
					"connector failed to connect"
				);
				Err(ConnectorError::Creation {
					service: self.service.clone(),
					destination: self.credentials.destination.clone(),
					source,
				})
			},
		}
	}

	pub fn service(&self) -> &str {
		&self.service
	}

	pub fn kind(&self) -> ConnectorKind {
		self.kind
	}

	pub fn credentials(&self) -> &Credentials {
		&self.credentials
	}

	pub fn schema(&self) -> Option<&Arc<CanonicalSchema>> {
		self.schema.as_ref()
	}

	pub fn state(&self) -> ConnectorState {
		*self.state.lock()
	}

	/// Whether the connector can serve requests
	pub fn is_usable(&self) -> bool {
		!self.is_invalidated() && matches!(self.state(), ConnectorState::Connected | ConnectorState::Ready)
	}

	/// Mark the connector unusable. Every later operation fails with `Invalidated`.
	pub fn invalidate(&self) {
		if !self.invalidated.swap(true, Ordering::SeqCst) {
			debug!(target: "metabridge", service = %self.service, "connector invalidated");
		}
	}

	pub fn is_invalidated(&self) -> bool {
		self.invalidated.load(Ordering::SeqCst)
	}

	fn context(&self) -> Result<RequestContext<'_>, ConnectorError> {
		if self.is_invalidated() {
			return Err(ConnectorError::Invalidated(self.service.clone()));
		}
		let state = self.state();
		let schema = match (&self.schema, state) {
			(Some(schema), ConnectorState::Connected | ConnectorState::Ready) => schema,
			_ => {
				return Err(ConnectorError::NotConnected {
					service: self.service.clone(),
					state,
				});
			},
		};
		Ok(RequestContext {
			transport: self.transport.as_ref(),
			credentials: &self.credentials,
			schema: schema.as_ref(),
		})
	}

	fn mark_ready(&self) {
		let mut state = self.state.lock();
		if *state == ConnectorState::Connected {
			*state = ConnectorState::Ready;
		}
	}

	/// Read at most `limit` records of an entity (qualified or service-local name)
	pub async fn read(&self, entity: &str, limit: usize) -> Result<Vec<Record>, ConnectorError> {
		let ctx = self.context()?;
		let records = self.kind.operations().read(ctx, entity, limit).await?;
		self.mark_ready();
		Ok(records)
	}

	/// Create a record. Never reaches the network for protocols without create.
	pub async fn create(&self, entity: &str, payload: Record) -> Result<Record, ConnectorError> {
		if !self.kind.supports_create() {
			return Err(ConnectorError::unsupported("create", self.kind.service_kind()));
		}
		let ctx = self.context()?;
		let record = self.kind.operations().create(ctx, entity, payload).await?;
		self.mark_ready();
		Ok(record)
	}

	pub async fn invoke(&self, operation: &OperationDescriptor, params: &Params) -> Result<Value, ConnectorError> {
		let ctx = self.context()?;
		if let Some(missing) = operation
			.parameters()
			.iter()
			.find(|p| p.required && !params.contains_key(&p.name))
		{
			return Err(ConnectorError::MissingParameter(missing.name.clone()));
		}
		let response = self.kind.operations().invoke(ctx, operation, params).await?;
		self.mark_ready();
		Ok(response)
	}
}

/// Plain string form of a parameter value (strings unquoted)
pub(crate) fn plain_value(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}
