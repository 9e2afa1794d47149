// Named operation invocation
//
// Resolves an operation by name in a compiled schema and executes it through
// the service's connector.

use serde_json::Value;
use tracing::debug;

use crate::connector::{Connector, Params};
use crate::error::InvokeError;
use crate::schema::{CanonicalSchema, Definition};

#[derive(Debug, Clone, Copy, Default)]
pub struct OperationInvoker;

impl OperationInvoker {
	/// Resolve a definition by qualified name, or by its name within the service
	fn resolve<'a>(schema: &'a CanonicalSchema, name: &str) -> Option<Definition<'a>> {
		schema
			.find(name)
			.or_else(|| schema.find(&format!("{}.{}", schema.service(), name)))
	}

	pub async fn invoke(
		schema: &CanonicalSchema,
		connector: &Connector,
		name: &str,
		params: &Params,
	) -> Result<Value, InvokeError> {
		let definition = Self::resolve(schema, name).ok_or_else(|| InvokeError::NotFound(name.to_string()))?;
		let operation = definition.as_operation().ok_or_else(|| InvokeError::NotAnOperation {
			name: definition.qualified_name().to_string(),
			kind: definition.kind(),
		})?;

		debug!(
			target: "metabridge",
			service = %connector.service(),
			operation = %operation.qualified_name(),
			method = %operation.http_method(),
			"invoking operation"
		);
		Ok(connector.invoke(operation, params).await?)
	}
}
