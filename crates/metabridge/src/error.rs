// Pipeline error types

use thiserror::Error;

use crate::catalog::ServiceKind;
use crate::connector::ConnectorState;
use crate::report::Stage;
use crate::schema::DefinitionKind;
use crate::transport::TransportError;

/// Errors raised while reading the service catalog. Fatal for a whole load.
#[derive(Error, Debug)]
pub enum LoadError {
	#[error("service catalog unavailable: {0}")]
	CatalogUnavailable(String),
}

/// Errors raised while retrieving a metadata document
#[derive(Error, Debug)]
pub enum FetchError {
	#[error("service '{0}' is not active")]
	Inactive(String),

	#[error("rest service '{0}' does not declare an openapi document URL")]
	MissingOpenApiUrl(String),

	#[error("metadata request failed: {0}")]
	Transport(#[from] TransportError),

	#[error("metadata request to '{url}' failed with status {status}")]
	Status { url: String, status: u16 },

	#[error("metadata response from '{0}' has an empty body")]
	EmptyBody(String),
}

impl FetchError {
	pub fn status(url: impl Into<String>, status: u16) -> Self {
		Self::Status {
			url: url.into(),
			status,
		}
	}
}

/// Errors raised while compiling a metadata document into a canonical schema
#[derive(Error, Debug)]
pub enum CompileError {
	#[error("invalid EDMX document: {0}")]
	Xml(String),

	#[error("invalid OpenAPI document: {0}")]
	Json(#[from] serde_json::Error),

	#[error("missing required element <{0}>")]
	MissingElement(&'static str),

	#[error("missing required attribute '{attribute}' on <{element}>")]
	MissingAttribute { element: String, attribute: String },

	#[error("entity set '{set}' references unknown entity type '{entity_type}'")]
	UnknownEntityType { set: String, entity_type: String },

	#[error("unsupported OpenAPI version '{0}' (expected 3.x)")]
	UnsupportedVersion(String),

	#[error("unresolved reference '{0}'")]
	UnresolvedReference(String),

	#[error("unsupported HTTP method '{0}'")]
	InvalidMethod(String),

	#[error("{compiler} compiler cannot compile a {document} document")]
	DocumentMismatch {
		compiler: &'static str,
		document: &'static str,
	},

	#[error("duplicate definition '{0}'")]
	DuplicateDefinition(String),
}

impl CompileError {
	pub fn missing_attribute(element: impl Into<String>, attribute: impl Into<String>) -> Self {
		Self::MissingAttribute {
			element: element.into(),
			attribute: attribute.into(),
		}
	}
}

/// Errors raised by a connector, either while being established or while serving a request
#[derive(Error, Debug)]
pub enum ConnectorError {
	#[error("failed to connect service '{service}' to destination '{destination}': {source}")]
	Creation {
		service: String,
		destination: String,
		#[source]
		source: TransportError,
	},

	#[error("schema for service '{service}' was compiled from a {schema} document, connector kind is {kind}")]
	SchemaMismatch {
		service: String,
		kind: ServiceKind,
		schema: ServiceKind,
	},

	#[error("operation '{operation}' is not supported by {kind} connectors")]
	UnsupportedOperation {
		operation: &'static str,
		kind: ServiceKind,
	},

	#[error("entity '{0}' not found in schema")]
	EntityNotFound(String),

	#[error("missing required parameter '{0}'")]
	MissingParameter(String),

	#[error("invalid request parameters: {0}")]
	InvalidParameters(String),

	#[error(transparent)]
	Transport(#[from] TransportError),

	#[error("request to '{url}' failed with status {status}")]
	Status {
		url: String,
		status: u16,
		body: String,
	},

	#[error("failed to decode response from '{url}': {message}")]
	Decode { url: String, message: String },

	#[error("connector for service '{0}' has been invalidated")]
	Invalidated(String),

	#[error("connector for service '{service}' is {state} and cannot serve requests")]
	NotConnected {
		service: String,
		state: ConnectorState,
	},
}

impl ConnectorError {
	pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
		Self::Decode {
			url: url.into(),
			message: message.into(),
		}
	}

	pub fn unsupported(operation: &'static str, kind: ServiceKind) -> Self {
		Self::UnsupportedOperation { operation, kind }
	}
}

/// A single entity's probe failure
#[derive(Error, Debug)]
#[error("probe of entity '{entity}' failed: {source}")]
pub struct ProbeError {
	pub entity: String,
	#[source]
	pub source: ConnectorError,
}

/// Errors raised while resolving and invoking a named operation
#[derive(Error, Debug)]
pub enum InvokeError {
	#[error("operation '{0}' not found in schema")]
	NotFound(String),

	/// The name resolves, but to an entity or association. Callers treating
	/// both as "no such operation" should use [`InvokeError::is_not_found`].
	#[error("operation '{name}' not found ({kind} definition)")]
	NotAnOperation { name: String, kind: DefinitionKind },

	#[error(transparent)]
	Connector(#[from] ConnectorError),
}

impl InvokeError {
	/// True when the name does not denote an invocable operation
	pub fn is_not_found(&self) -> bool {
		matches!(self, InvokeError::NotFound(_) | InvokeError::NotAnOperation { .. })
	}
}

/// Errors raised by post-connection hooks
#[derive(Error, Debug)]
pub enum HookError {
	#[error(transparent)]
	Invoke(#[from] InvokeError),

	#[error(transparent)]
	Connector(#[from] ConnectorError),
}

/// A failure that stopped one service's pipeline. Never affects sibling services.
#[derive(Error, Debug)]
pub enum ServiceError {
	#[error(transparent)]
	Fetch(#[from] FetchError),

	#[error(transparent)]
	Compile(#[from] CompileError),

	#[error(transparent)]
	Connector(#[from] ConnectorError),
}

impl ServiceError {
	/// Pipeline stage the failure occurred in
	pub fn stage(&self) -> Stage {
		match self {
			ServiceError::Fetch(_) => Stage::Fetch,
			ServiceError::Compile(_) => Stage::Compile,
			ServiceError::Connector(_) => Stage::Connect,
		}
	}
}
