// Post-connection hooks
//
// Hooks run after a service has been probed, against its live connector.
// Their results are recorded in the service report; a failing hook never
// fails the service.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::connector::{Connector, Params, Record};
use crate::error::HookError;
use crate::invoke::OperationInvoker;
use crate::schema::CanonicalSchema;

const DEFAULT_READ_LIMIT: usize = 1000;

#[async_trait]
pub trait PostConnectHook: Send + Sync {
	fn name(&self) -> &str;

	/// Whether the hook runs for `service`
	fn applies_to(&self, _service: &str) -> bool {
		true
	}

	async fn run(&self, service: &str, connector: &Connector, schema: &CanonicalSchema) -> Result<Value, HookError>;
}

/// Reads an entity, creates a record in it, and reads it again
#[derive(Debug, Clone)]
pub struct CreateRecordHook {
	name: String,
	service: Option<String>,
	entity: String,
	payload: Record,
	read_limit: usize,
}

impl CreateRecordHook {
	pub fn new(entity: impl Into<String>, payload: Record) -> Self {
		let entity = entity.into();
		Self {
			name: format!("create:{}", entity),
			service: None,
			entity,
			payload,
			read_limit: DEFAULT_READ_LIMIT,
		}
	}

	pub fn for_service(mut self, service: impl Into<String>) -> Self {
		self.service = Some(service.into());
		self
	}

	pub fn with_read_limit(mut self, read_limit: usize) -> Self {
		self.read_limit = read_limit;
		self
	}
}

#[async_trait]
impl PostConnectHook for CreateRecordHook {
	fn name(&self) -> &str {
		&self.name
	}

	fn applies_to(&self, service: &str) -> bool {
		self.service.as_deref().is_none_or(|s| s == service)
	}

	async fn run(&self, _service: &str, connector: &Connector, _schema: &CanonicalSchema) -> Result<Value, HookError> {
		let before = connector.read(&self.entity, self.read_limit).await?.len();
		let created = connector.create(&self.entity, self.payload.clone()).await?;
		let after = connector.read(&self.entity, self.read_limit).await?.len();
		Ok(json!({
			"before": before,
			"created": created,
			"after": after,
		}))
	}
}

/// Invokes a named operation with fixed parameters
#[derive(Debug, Clone)]
pub struct InvokeOperationHook {
	name: String,
	service: Option<String>,
	operation: String,
	params: Params,
}

impl InvokeOperationHook {
	pub fn new(operation: impl Into<String>, params: Params) -> Self {
		let operation = operation.into();
		Self {
			name: format!("invoke:{}", operation),
			service: None,
			operation,
			params,
		}
	}

	pub fn for_service(mut self, service: impl Into<String>) -> Self {
		self.service = Some(service.into());
		self
	}
}

#[async_trait]
impl PostConnectHook for InvokeOperationHook {
	fn name(&self) -> &str {
		&self.name
	}

	fn applies_to(&self, service: &str) -> bool {
		self.service.as_deref().is_none_or(|s| s == service)
	}

	async fn run(&self, _service: &str, connector: &Connector, schema: &CanonicalSchema) -> Result<Value, HookError> {
		Ok(OperationInvoker::invoke(schema, connector, &self.operation, &self.params).await?)
	}
}

fn default_read_limit() -> usize {
	DEFAULT_READ_LIMIT
}

/// Hook declaration as it appears in configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HookSpec {
	Create {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		service: Option<String>,
		entity: String,
		payload: Value,
		#[serde(default = "default_read_limit")]
		read_limit: usize,
	},
	Invoke {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		service: Option<String>,
		operation: String,
		#[serde(default)]
		params: Params,
	},
}

impl HookSpec {
	pub fn service(&self) -> Option<&str> {
		match self {
			HookSpec::Create { service, .. } | HookSpec::Invoke { service, .. } => service.as_deref(),
		}
	}

	pub fn into_hook(self) -> Arc<dyn PostConnectHook> {
		match self {
			HookSpec::Create {
				service,
				entity,
				payload,
				read_limit,
			} => {
				let mut hook = CreateRecordHook::new(entity, payload).with_read_limit(read_limit);
				if let Some(service) = service {
					hook = hook.for_service(service);
				}
				Arc::new(hook)
			},
			HookSpec::Invoke {
				service,
				operation,
				params,
			} => {
				let mut hook = InvokeOperationHook::new(operation, params);
				if let Some(service) = service {
					hook = hook.for_service(service);
				}
				Arc::new(hook)
			},
		}
	}
}
