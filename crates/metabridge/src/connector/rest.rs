// REST request shapes
//
// Operations are addressed by their OpenAPI path under the service root.
// Path template parameters are substituted from the invocation params,
// parameters declared `in: header` or `in: cookie` become request headers and
// whatever remains goes on the query string.

use async_trait::async_trait;
use percent_encoding::utf8_percent_encode;
use serde_json::Value;

use super::{PATH_SEGMENT, Params, Record, RequestContext, ServiceOperations, plain_value};
use crate::catalog::ServiceKind;
use crate::error::ConnectorError;
use crate::schema::{OperationDescriptor, ParameterLocation};
use crate::transport::HttpRequest;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestOperations;

impl RestOperations {
	/// Build the full request for an operation: URL plus header and cookie params
	pub fn operation_request(root: &str, operation: &OperationDescriptor, params: &Params) -> Result<HttpRequest, ConnectorError> {
		let url = Self::operation_url(root, operation, params)?;
		let mut request = HttpRequest::new(operation.http_method().clone(), url);

		let mut cookies = Vec::new();
		for parameter in operation.parameters() {
			let Some(value) = params.get(&parameter.name) else {
				continue;
			};
			match parameter.location {
				ParameterLocation::Header => request = request.with_header(parameter.name.as_str(), plain_value(value)),
				ParameterLocation::Cookie => cookies.push(format!("{}={}", parameter.name, plain_value(value))),
				ParameterLocation::Query | ParameterLocation::Path => {},
			}
		}
		if !cookies.is_empty() {
			request = request.with_header(http::header::COOKIE.as_str(), cookies.join("; "));
		}
		Ok(request)
	}

	/// Build the request URL for an operation, relative to the destination
	pub fn operation_url(root: &str, operation: &OperationDescriptor, params: &Params) -> Result<String, ConnectorError> {
		let mut remaining = params.clone();
		for parameter in operation.parameters() {
			if matches!(parameter.location, ParameterLocation::Header | ParameterLocation::Cookie) {
				remaining.remove(&parameter.name);
			}
		}
		let mut path = String::with_capacity(operation.http_path().len());

		let mut rest = operation.http_path();
		while let Some(start) = rest.find('{') {
			let Some(len) = rest[start..].find('}') else {
				break;
			};
			let name = &rest[start + 1..start + len];
			let value = remaining
				.remove(name)
				.ok_or_else(|| ConnectorError::MissingParameter(name.to_string()))?;

			path.push_str(&rest[..start]);
			path.extend(utf8_percent_encode(&plain_value(&value), PATH_SEGMENT));
			rest = &rest[start + len + 1..];
		}
		path.push_str(rest);

		let pairs: Vec<_> = remaining
			.iter()
			.map(|(key, value)| (key.as_str(), plain_value(value)))
			.collect();
		let query = serde_urlencoded::to_string(&pairs).map_err(|e| ConnectorError::InvalidParameters(e.to_string()))?;

		let base = root.trim_end_matches('/');
		Ok(if query.is_empty() {
			format!("{}{}", base, path)
		} else {
			format!("{}{}?{}", base, path, query)
		})
	}
}

#[async_trait]
impl ServiceOperations for RestOperations {
	async fn read(&self, ctx: RequestContext<'_>, entity: &str, limit: usize) -> Result<Vec<Record>, ConnectorError> {
		let descriptor = ctx.entity(entity)?;
		let url = format!("{}/{}", ctx.credentials.path.trim_end_matches('/'), descriptor.name());

		let mut records = match ctx.send_json(HttpRequest::get(url)).await? {
			Value::Array(records) => records,
			Value::Null => Vec::new(),
			other => vec![other],
		};
		records.truncate(limit);
		Ok(records)
	}

	async fn create(&self, _ctx: RequestContext<'_>, _entity: &str, _payload: Record) -> Result<Record, ConnectorError> {
		Err(ConnectorError::unsupported("create", ServiceKind::Rest))
	}

	async fn invoke(
		&self,
		ctx: RequestContext<'_>,
		operation: &OperationDescriptor,
		params: &Params,
	) -> Result<Value, ConnectorError> {
		let request = Self::operation_request(&ctx.credentials.path, operation, params)?;
		ctx.send_json(request).await
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use http::Method;
	use serde_json::json;

	use super::*;
	use crate::connector::{Connector, ConnectorKind, Credentials};
	use crate::schema::{CanonicalSchema, OperationKind, ParameterDescriptor, ParameterLocation};
	use crate::testing::MockTransport;

	fn find_by_status() -> OperationDescriptor {
		OperationDescriptor::new(
			"Swagger.Petstore.pet_findByStatus",
			OperationKind::Function,
			"/pet/findByStatus",
			Method::GET,
		)
		.with_parameters(vec![ParameterDescriptor::new("status", ParameterLocation::Query, false)])
	}

	fn params(value: Value) -> Params {
		value.as_object().cloned().unwrap()
	}

	async fn connected(transport: Arc<MockTransport>, path: &str) -> Connector {
		let schema = CanonicalSchema::builder("Swagger.Petstore", ServiceKind::Rest)
			.operation(find_by_status())
			.build()
			.unwrap();
		let connector = Connector::new(
			"Petstore",
			ConnectorKind::Rest(RestOperations),
			Credentials {
				destination: "petstore".to_string(),
				path: path.to_string(),
			},
			transport,
		)
		.bind_metadata(Arc::new(schema))
		.unwrap();
		connector.connect().await.unwrap();
		connector
	}

	#[test]
	fn test_path_construction() {
		let url = RestOperations::operation_url("", &find_by_status(), &params(json!({"status": "available"}))).unwrap();
		assert_eq!(url, "/pet/findByStatus?status=available");
	}

	#[test]
	fn test_path_template_substitution() {
		let operation = OperationDescriptor::new(
			"Swagger.Petstore.pet_petId_uploadImage",
			OperationKind::Action,
			"/pet/{petId}/uploadImage",
			Method::POST,
		);
		let url = RestOperations::operation_url(
			"/api/v3/",
			&operation,
			&params(json!({"petId": 10, "additionalMetadata": "a b"})),
		)
		.unwrap();
		assert_eq!(url, "/api/v3/pet/10/uploadImage?additionalMetadata=a+b");

		let url = RestOperations::operation_url("", &operation, &params(json!({"petId": "x/y"}))).unwrap();
		assert_eq!(url, "/pet/x%2Fy/uploadImage");
	}

	#[test]
	fn test_missing_path_parameter() {
		let operation = OperationDescriptor::new(
			"Swagger.Petstore.pet_petId",
			OperationKind::Function,
			"/pet/{petId}",
			Method::GET,
		);
		let err = RestOperations::operation_url("", &operation, &Params::new()).unwrap_err();
		assert!(matches!(err, ConnectorError::MissingParameter(name) if name == "petId"));
	}

	fn delete_pet() -> OperationDescriptor {
		OperationDescriptor::new(
			"Swagger.Petstore.pet_petId_delete",
			OperationKind::Action,
			"/pet/{petId}",
			Method::DELETE,
		)
		.with_parameters(vec![
			ParameterDescriptor::new("api_key", ParameterLocation::Header, false),
			ParameterDescriptor::new("petId", ParameterLocation::Path, true),
			ParameterDescriptor::new("session", ParameterLocation::Cookie, false),
			ParameterDescriptor::new("tenant", ParameterLocation::Cookie, false),
		])
	}

	#[test]
	fn test_header_and_cookie_params_leave_the_query() {
		let params = params(json!({"petId": 10, "api_key": "special-key", "session": "abc", "tenant": 7}));

		let url = RestOperations::operation_url("/api/v3", &delete_pet(), &params).unwrap();
		assert_eq!(url, "/api/v3/pet/10");

		let request = RestOperations::operation_request("/api/v3", &delete_pet(), &params).unwrap();
		assert_eq!(request.method, Method::DELETE);
		assert_eq!(request.url, "/api/v3/pet/10");
		assert_eq!(
			request.headers,
			vec![
				("api_key".to_string(), "special-key".to_string()),
				("cookie".to_string(), "session=abc; tenant=7".to_string()),
			]
		);
	}

	#[test]
	fn test_absent_header_params_are_not_sent() {
		let request = RestOperations::operation_request("", &delete_pet(), &params(json!({"petId": 3}))).unwrap();
		assert_eq!(request.url, "/pet/3");
		assert!(request.headers.is_empty());
	}

	#[tokio::test]
	async fn test_invoke_issues_get_with_query() {
		let transport = Arc::new(MockTransport::new().with_json(
			Method::GET,
			"/pet/findByStatus?status=available",
			json!([{"id": 1, "status": "available"}]),
		));
		let connector = connected(transport.clone(), "").await;

		let response = connector
			.invoke(&find_by_status(), &params(json!({"status": "available"})))
			.await
			.unwrap();
		assert_eq!(response[0]["id"], 1);

		let request = &transport.requests()[0].request;
		assert_eq!(request.method, Method::GET);
		assert_eq!(request.url, "/pet/findByStatus?status=available");
	}

	#[tokio::test]
	async fn test_create_is_unsupported_without_network() {
		let transport = Arc::new(MockTransport::new());
		let connector = connected(transport.clone(), "/api/v3").await;

		let err = connector.create("Pet", json!({"name": "doggie"})).await.unwrap_err();
		assert!(matches!(
			err,
			ConnectorError::UnsupportedOperation {
				operation: "create",
				kind: ServiceKind::Rest
			}
		));
		assert!(transport.requests().is_empty());
	}
}
