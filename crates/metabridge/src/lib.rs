// Metabridge
//
// Discovers externally hosted services at runtime:
// - Fetches OData ($metadata) or OpenAPI documents for each catalog entry
// - Compiles them into one protocol-agnostic canonical schema
// - Caches one connector per service and drives read/create/invoke through it
// - Probes every discovered entity and aggregates per-service reports

pub mod catalog;
pub mod compile;
pub mod config;
pub mod connector;
mod error;
pub mod fetch;
pub mod hooks;
pub mod invoke;
pub mod loader;
pub mod probe;
pub mod registry;
pub mod report;
pub mod schema;
pub mod telemetry;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use catalog::{ServiceCatalog, ServiceDescriptor, ServiceKind, StaticCatalog};
pub use compile::{ODataVersion, SchemaCompiler};
pub use config::{Config, ConfigError, LoaderConfig, parse_duration};
pub use connector::{Connector, ConnectorKind, ConnectorState, Credentials, Params, Record};
pub use error::{
	CompileError, ConnectorError, FetchError, HookError, InvokeError, LoadError, ProbeError,
	ServiceError,
};
pub use fetch::{MetadataFetcher, RawDocument};
pub use hooks::{CreateRecordHook, HookSpec, InvokeOperationHook, PostConnectHook};
pub use invoke::OperationInvoker;
pub use loader::{OperationFilter, ServiceLoader, ServiceLoaderBuilder};
pub use probe::{EntityProbe, ProbeExecutor, ProbeOutcome, ProbeReport};
pub use registry::ConnectorRegistry;
pub use report::{InvocationOutcome, InvocationResult, LoadReport, ServiceOutcome, ServiceReport, Stage};
pub use schema::{
	AssociationDescriptor, AssociationEnd, CanonicalSchema, Definition, DefinitionKind,
	EntityDescriptor, EntityKind, NavigationDescriptor, OperationDescriptor, OperationKind,
	ParameterDescriptor, ParameterLocation, PropertyDescriptor, SchemaBuilder,
};
pub use transport::{
	AuthConfig, Destination, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport,
	TransportError,
};
