// Service loader
//
// Drives one load cycle: read the catalog, then for every active service
// fetch -> compile -> connect -> probe -> invoke -> hooks, with a bounded
// number of services in flight. Each service's failure is recorded in the
// report and never affects its siblings. Cancellation (external token or the
// configured timeout) stops unfinished services, which are reported as not
// processed.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level, debug, info, info_span, trace, warn};

use crate::catalog::{ServiceCatalog, ServiceDescriptor, ServiceKind};
use crate::compile::SchemaCompiler;
use crate::config::LoaderConfig;
use crate::connector::{Connector, Params};
use crate::error::{LoadError, ServiceError};
use crate::fetch::MetadataFetcher;
use crate::hooks::PostConnectHook;
use crate::invoke::OperationInvoker;
use crate::probe::ProbeExecutor;
use crate::registry::ConnectorRegistry;
use crate::report::{InvocationOutcome, LoadReport, ServiceOutcome, ServiceReport};
use crate::schema::{CanonicalSchema, OperationDescriptor};
use crate::transport::HttpTransport;

/// Selects the operations invoked (with empty parameters) after probing
pub type OperationFilter = Arc<dyn Fn(&str, &OperationDescriptor) -> bool + Send + Sync>;

pub struct ServiceLoaderBuilder {
	catalog: Arc<dyn ServiceCatalog>,
	transport: Arc<dyn HttpTransport>,
	config: LoaderConfig,
	hooks: Vec<Arc<dyn PostConnectHook>>,
	operation_filter: Option<OperationFilter>,
	registry: Option<Arc<ConnectorRegistry>>,
}

impl ServiceLoaderBuilder {
	pub fn config(mut self, config: LoaderConfig) -> Self {
		self.config = config;
		self
	}

	pub fn hook(mut self, hook: Arc<dyn PostConnectHook>) -> Self {
		self.hooks.push(hook);
		self
	}

	pub fn hooks(mut self, hooks: impl IntoIterator<Item = Arc<dyn PostConnectHook>>) -> Self {
		self.hooks.extend(hooks);
		self
	}

	pub fn operation_filter<F>(mut self, filter: F) -> Self
	where
		F: Fn(&str, &OperationDescriptor) -> bool + Send + Sync + 'static,
	{
		self.operation_filter = Some(Arc::new(filter));
		self
	}

	/// Share a connector registry across loaders (defaults to a fresh one)
	pub fn registry(mut self, registry: Arc<ConnectorRegistry>) -> Self {
		self.registry = Some(registry);
		self
	}

	pub fn build(self) -> ServiceLoader {
		let registry = self.registry.unwrap_or_else(|| {
			Arc::new(ConnectorRegistry::new(self.transport.clone()).with_odata_version(self.config.odata_version))
		});
		ServiceLoader {
			catalog: self.catalog,
			fetcher: MetadataFetcher::new(self.transport),
			registry,
			probe: ProbeExecutor::new(self.config.probe_concurrency, self.config.probe_limit),
			config: self.config,
			hooks: self.hooks,
			operation_filter: self.operation_filter,
		}
	}
}

pub struct ServiceLoader {
	catalog: Arc<dyn ServiceCatalog>,
	fetcher: MetadataFetcher,
	registry: Arc<ConnectorRegistry>,
	probe: ProbeExecutor,
	config: LoaderConfig,
	hooks: Vec<Arc<dyn PostConnectHook>>,
	operation_filter: Option<OperationFilter>,
}

impl ServiceLoader {
	pub fn builder(catalog: Arc<dyn ServiceCatalog>, transport: Arc<dyn HttpTransport>) -> ServiceLoaderBuilder {
		ServiceLoaderBuilder {
			catalog,
			transport,
			config: LoaderConfig::default(),
			hooks: Vec::new(),
			operation_filter: None,
			registry: None,
		}
	}

	pub fn registry(&self) -> &Arc<ConnectorRegistry> {
		&self.registry
	}

	pub fn config(&self) -> &LoaderConfig {
		&self.config
	}

	/// Run one load cycle, bounded by the configured timeout
	pub async fn load_services(&self) -> Result<LoadReport, LoadError> {
		self.load_services_with_cancel(CancellationToken::new()).await
	}

	/// Run one load cycle that also stops when `cancel` fires.
	/// Only an unavailable catalog is an error; everything else is in the report.
	pub async fn load_services_with_cancel(&self, cancel: CancellationToken) -> Result<LoadReport, LoadError> {
		let token = cancel.child_token();
		let timer = self.config.timeout.map(|timeout| {
			let token = token.clone();
			tokio::spawn(async move {
				tokio::time::sleep(timeout).await;
				warn!(target: "metabridge", ?timeout, "load timed out, cancelling unfinished services");
				token.cancel();
			})
		});

		let result = self.run(&token).await;

		if let Some(timer) = timer {
			timer.abort();
		}
		result
	}

	async fn run(&self, token: &CancellationToken) -> Result<LoadReport, LoadError> {
		let services = tokio::select! {
			biased;
			_ = token.cancelled() => {
				info!(target: "metabridge", "load cancelled before the catalog was read");
				return Ok(LoadReport {
					services: Vec::new(),
					cancelled: true,
				});
			}
			services = self.catalog.list_active() => services?,
		};
		info!(
			target: "metabridge",
			services = services.len(),
			workers = self.config.workers,
			"loading services"
		);

		let mut reports: Vec<(usize, ServiceReport)> = stream::iter(services.into_iter().enumerate())
			.map(|(index, descriptor)| async move { (index, self.process(descriptor, token).await) })
			.buffer_unordered(self.config.workers.max(1))
			.collect()
			.await;
		reports.sort_by_key(|(index, _)| *index);

		let report = LoadReport {
			services: reports.into_iter().map(|(_, report)| report).collect(),
			cancelled: token.is_cancelled(),
		};
		info!(
			target: "metabridge",
			completed = report.completed().count(),
			failed = report.failed().count(),
			not_processed = report.not_processed().count(),
			cancelled = report.cancelled,
			"load finished"
		);
		Ok(report)
	}

	async fn process(&self, descriptor: ServiceDescriptor, token: &CancellationToken) -> ServiceReport {
		let span = info_span!(
			target: "metabridge",
			"service",
			name = %descriptor.name,
			kind = %descriptor.kind
		);

		let outcome = tokio::select! {
			biased;
			_ = token.cancelled() => {
				info!(target: "metabridge", service = %descriptor.name, "service not processed");
				ServiceOutcome::NotProcessed
			}
			result = self.pipeline(&descriptor).instrument(span) => match result {
				Ok(outcome) => outcome,
				Err(error) => {
					warn!(
						target: "metabridge",
						service = %descriptor.name,
						stage = ?error.stage(),
						%error,
						"service failed"
					);
					ServiceOutcome::Failed {
						stage: error.stage(),
						error,
					}
				},
			},
		};

		ServiceReport {
			service: descriptor.name,
			kind: descriptor.kind,
			outcome,
		}
	}

	async fn pipeline(&self, descriptor: &ServiceDescriptor) -> Result<ServiceOutcome, ServiceError> {
		let document = self.fetcher.fetch(descriptor).await?;

		let compiler = SchemaCompiler::for_descriptor(descriptor, self.config.odata_version);
		let schema = Arc::new(compiler.compile(&descriptor.name, &document)?);
		info!(
			target: "metabridge",
			namespace = %schema.service(),
			entities = schema.entities().len(),
			operations = schema.operations().len(),
			associations = schema.associations().len(),
			"schema compiled"
		);
		dump_schema(descriptor.kind, &schema);

		let connector = self
			.registry
			.get_or_create(
				&descriptor.name,
				descriptor.kind,
				schema.clone(),
				descriptor.credentials(),
			)
			.await?;

		let probe = self.probe.probe_all(&connector, &schema).await;
		let operations = self.invoke_selected(descriptor, &connector, &schema).await;
		let hooks = self.run_hooks(descriptor, &connector, &schema).await;

		Ok(ServiceOutcome::Completed {
			probe,
			operations,
			hooks,
		})
	}

	async fn invoke_selected(
		&self,
		descriptor: &ServiceDescriptor,
		connector: &Connector,
		schema: &CanonicalSchema,
	) -> Vec<InvocationOutcome> {
		let Some(filter) = &self.operation_filter else {
			return Vec::new();
		};

		let params = Params::new();
		let mut outcomes = Vec::new();
		for operation in schema
			.operations()
			.iter()
			.filter(|op| filter(&descriptor.name, op))
		{
			let name = operation.qualified_name();
			let result = OperationInvoker::invoke(schema, connector, name, &params).await;
			match &result {
				Ok(_) => info!(target: "metabridge", service = %descriptor.name, operation = %name, "operation invoked"),
				Err(e) => warn!(target: "metabridge", service = %descriptor.name, operation = %name, error = %e, "operation failed"),
			}
			outcomes.push(InvocationOutcome::from_result(name, result));
		}
		outcomes
	}

	async fn run_hooks(
		&self,
		descriptor: &ServiceDescriptor,
		connector: &Connector,
		schema: &CanonicalSchema,
	) -> Vec<InvocationOutcome> {
		let mut outcomes = Vec::new();
		for hook in self.hooks.iter().filter(|h| h.applies_to(&descriptor.name)) {
			let result = hook.run(&descriptor.name, connector, schema).await;
			match &result {
				Ok(response) => info!(
					target: "metabridge",
					service = %descriptor.name,
					hook = hook.name(),
					%response,
					"hook completed"
				),
				Err(e) => warn!(target: "metabridge", service = %descriptor.name, hook = hook.name(), error = %e, "hook failed"),
			}
			outcomes.push(InvocationOutcome::from_result(hook.name(), result));
		}
		outcomes
	}
}

/// Emit the compiled schema: odata at debug, rest at trace
fn dump_schema(kind: ServiceKind, schema: &CanonicalSchema) {
	let enabled = match kind {
		ServiceKind::OData => tracing::enabled!(target: "metabridge", Level::DEBUG),
		ServiceKind::Rest => tracing::enabled!(target: "metabridge", Level::TRACE),
	};
	if !enabled {
		return;
	}

	let dump = match serde_json::to_string(schema) {
		Ok(dump) => dump,
		Err(e) => {
			warn!(target: "metabridge", error = %e, "failed to serialize schema");
			return;
		},
	};
	let entities: Vec<_> = schema.entities().iter().map(|e| e.qualified_name()).collect();
	let operations: Vec<_> = schema.operations().iter().map(|o| o.qualified_name()).collect();

	match kind {
		ServiceKind::OData => debug!(target: "metabridge", ?entities, ?operations, schema = %dump, "compiled schema"),
		ServiceKind::Rest => trace!(target: "metabridge", ?entities, ?operations, schema = %dump, "compiled schema"),
	}
}
