// OData request shapes
//
// Reads address the entity set with `$top`/`$format`, creates post to the
// entity set, and operation imports are called V2-style (query options) or
// V4-style (function parameters inline, action parameters in the body).

use async_trait::async_trait;
use http::Method;
use percent_encoding::utf8_percent_encode;
use serde_json::Value;

use super::{PATH_SEGMENT, Params, Record, RequestContext, ServiceOperations, plain_value, service_root};
use crate::compile::ODataVersion;
use crate::error::ConnectorError;
use crate::schema::{OperationDescriptor, OperationKind};
use crate::transport::HttpRequest;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ODataOperations {
	version: ODataVersion,
}

impl ODataOperations {
	pub fn new(version: ODataVersion) -> Self {
		Self { version }
	}

	pub fn version(&self) -> ODataVersion {
		self.version
	}

	fn invoke_request(&self, root: &str, operation: &OperationDescriptor, params: &Params) -> Result<HttpRequest, ConnectorError> {
		let name = operation.http_path();
		let typed_literal = |key: &str, value: &Value| {
			let edm_type = operation
				.parameters()
				.iter()
				.find(|p| p.name == key)
				.and_then(|p| p.edm_type.as_deref());
			literal(value, edm_type, self.version)
		};
		match (self.version, operation.kind()) {
			(ODataVersion::V2, _) => {
				let pairs: Vec<_> = params
					.iter()
					.map(|(key, value)| (key.as_str(), typed_literal(key.as_str(), value)))
					.collect();
				let query =
					serde_urlencoded::to_string(&pairs).map_err(|e| ConnectorError::InvalidParameters(e.to_string()))?;
				let url = if query.is_empty() {
					format!("{}{}", root, name)
				} else {
					format!("{}{}?{}", root, name, query)
				};
				Ok(HttpRequest::new(operation.http_method().clone(), url))
			},
			(ODataVersion::V4, OperationKind::Function) => {
				let inline = params
					.iter()
					.map(|(key, value)| format!("{}={}", key, utf8_percent_encode(&typed_literal(key.as_str(), value), PATH_SEGMENT)))
					.collect::<Vec<_>>()
					.join(",");
				Ok(HttpRequest::new(Method::GET, format!("{}{}({})", root, name, inline)))
			},
			(ODataVersion::V4, OperationKind::Action) => Ok(HttpRequest::post(
				format!("{}{}", root, name),
				Value::Object(params.clone()),
			)),
		}
	}
}

#[async_trait]
impl ServiceOperations for ODataOperations {
	async fn read(&self, ctx: RequestContext<'_>, entity: &str, limit: usize) -> Result<Vec<Record>, ConnectorError> {
		let descriptor = ctx.entity(entity)?;
		let url = format!(
			"{}{}?$top={}&$format=json",
			service_root(&ctx.credentials.path),
			descriptor.entity_set(),
			limit
		);

		let body = ctx.send_json(HttpRequest::get(url)).await?;
		let mut records = records(body);
		records.truncate(limit);
		Ok(records)
	}

	async fn create(&self, ctx: RequestContext<'_>, entity: &str, payload: Record) -> Result<Record, ConnectorError> {
		let descriptor = ctx.entity(entity)?;
		let url = format!("{}{}", service_root(&ctx.credentials.path), descriptor.entity_set());

		let body = ctx.send_json(HttpRequest::post(url, payload)).await?;
		Ok(unwrap_d(body))
	}

	async fn invoke(
		&self,
		ctx: RequestContext<'_>,
		operation: &OperationDescriptor,
		params: &Params,
	) -> Result<Value, ConnectorError> {
		let request = self.invoke_request(&service_root(&ctx.credentials.path), operation, params)?;
		let body = ctx.send_json(request).await?;
		Ok(unwrap_d(body))
	}
}

/// URI literal of a parameter value, shaped by its declared EDM type.
/// Quoted forms double embedded quotes. Untyped strings are quoted, anything
/// else is written as-is.
fn literal(value: &Value, edm_type: Option<&str>, version: ODataVersion) -> String {
	if value.is_null() {
		return "null".to_string();
	}
	let raw = plain_value(value);
	let quoted = |prefix: &str| format!("{}'{}'", prefix, raw.replace('\'', "''"));

	match (version, edm_type) {
		(_, Some("Edm.String")) => quoted(""),
		(_, Some("Edm.Binary")) => quoted("binary"),
		(ODataVersion::V2, Some("Edm.Guid")) => quoted("guid"),
		(ODataVersion::V2, Some("Edm.DateTime")) => quoted("datetime"),
		(ODataVersion::V2, Some("Edm.DateTimeOffset")) => quoted("datetimeoffset"),
		(ODataVersion::V2, Some("Edm.Time")) => quoted("time"),
		(ODataVersion::V2, Some("Edm.Int64")) => format!("{}L", raw),
		(ODataVersion::V2, Some("Edm.Decimal")) => format!("{}M", raw),
		(ODataVersion::V2, Some("Edm.Double")) => format!("{}d", raw),
		(ODataVersion::V2, Some("Edm.Single")) => format!("{}f", raw),
		(ODataVersion::V4, Some("Edm.Duration")) => quoted("duration"),
		// V4 writes guids, dates and wide numbers bare
		(_, Some(edm)) if edm.starts_with("Edm.") => raw,
		_ => match value {
			Value::String(_) => quoted(""),
			_ => raw,
		},
	}
}

/// V2 wraps payloads in `{"d": ...}`
fn unwrap_d(body: Value) -> Value {
	match body {
		Value::Object(mut map) => match map.remove("d") {
			Some(inner) => inner,
			None => Value::Object(map),
		},
		other => other,
	}
}

/// Records of a collection response: V2 `d.results` or bare `d`, V4 `value`
fn records(body: Value) -> Vec<Record> {
	match body {
		Value::Null => Vec::new(),
		Value::Array(records) => records,
		Value::Object(mut map) => {
			if let Some(d) = map.remove("d") {
				return match d {
					Value::Array(records) => records,
					Value::Object(mut d) => match d.remove("results") {
						Some(Value::Array(records)) => records,
						Some(other) => vec![other],
						None => vec![Value::Object(d)],
					},
					Value::Null => Vec::new(),
					other => vec![other],
				};
			}
			match map.remove("value") {
				Some(Value::Array(records)) => records,
				Some(other) => vec![other],
				None => vec![Value::Object(map)],
			}
		},
		other => vec![other],
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use serde_json::json;

	use super::*;
	use crate::catalog::ServiceKind;
	use crate::connector::{Connector, ConnectorKind, Credentials};
	use crate::schema::{CanonicalSchema, EntityDescriptor, ParameterDescriptor, ParameterLocation};
	use crate::testing::MockTransport;

	async fn connected(transport: Arc<MockTransport>, version: ODataVersion) -> Connector {
		let schema = CanonicalSchema::builder("CatalogService", ServiceKind::OData)
			.entity(EntityDescriptor::new("CatalogService.Orders", "Orders"))
			.build()
			.unwrap();
		let connector = Connector::new(
			"CatalogService",
			ConnectorKind::OData(ODataOperations::new(version)),
			Credentials {
				destination: "backend".to_string(),
				path: "/odata/catalog".to_string(),
			},
			transport,
		)
		.bind_metadata(Arc::new(schema))
		.unwrap();
		connector.connect().await.unwrap();
		connector
	}

	#[test]
	fn test_records_shapes() {
		assert_eq!(records(json!({"d": {"results": [1, 2]}})), vec![json!(1), json!(2)]);
		assert_eq!(records(json!({"d": [1]})), vec![json!(1)]);
		assert_eq!(records(json!({"value": [3]})), vec![json!(3)]);
		assert_eq!(records(json!({"d": {"ID": 7}})), vec![json!({"ID": 7})]);
		assert!(records(Value::Null).is_empty());
	}

	#[test]
	fn test_literal_quoting() {
		assert_eq!(literal(&json!("O'Brien"), None, ODataVersion::V2), "'O''Brien'");
		assert_eq!(literal(&json!("O'Brien"), Some("Edm.String"), ODataVersion::V4), "'O''Brien'");
		assert_eq!(literal(&json!(42), None, ODataVersion::V2), "42");
		assert_eq!(literal(&json!(true), Some("Edm.Boolean"), ODataVersion::V2), "true");
		assert_eq!(literal(&Value::Null, Some("Edm.Guid"), ODataVersion::V2), "null");
	}

	#[test]
	fn test_v2_literals_follow_edm_type() {
		let guid = json!("7e2b0c1a-5d1f-4c3e-9a4b-0123456789ab");
		assert_eq!(
			literal(&guid, Some("Edm.Guid"), ODataVersion::V2),
			"guid'7e2b0c1a-5d1f-4c3e-9a4b-0123456789ab'"
		);
		assert_eq!(
			literal(&json!("2024-05-01T00:00:00"), Some("Edm.DateTime"), ODataVersion::V2),
			"datetime'2024-05-01T00:00:00'"
		);
		assert_eq!(literal(&json!(9000000000u64), Some("Edm.Int64"), ODataVersion::V2), "9000000000L");
		assert_eq!(literal(&json!("12"), Some("Edm.Int64"), ODataVersion::V2), "12L");
		assert_eq!(literal(&json!("19.99"), Some("Edm.Decimal"), ODataVersion::V2), "19.99M");
		assert_eq!(literal(&json!(1.5), Some("Edm.Double"), ODataVersion::V2), "1.5d");
		assert_eq!(literal(&json!(7), Some("Edm.Int32"), ODataVersion::V2), "7");
	}

	#[test]
	fn test_v4_literals_follow_edm_type() {
		let guid = json!("7e2b0c1a-5d1f-4c3e-9a4b-0123456789ab");
		assert_eq!(
			literal(&guid, Some("Edm.Guid"), ODataVersion::V4),
			"7e2b0c1a-5d1f-4c3e-9a4b-0123456789ab"
		);
		assert_eq!(literal(&json!(9000000000u64), Some("Edm.Int64"), ODataVersion::V4), "9000000000");
		assert_eq!(
			literal(&json!("2024-05-01T00:00:00Z"), Some("Edm.DateTimeOffset"), ODataVersion::V4),
			"2024-05-01T00:00:00Z"
		);
		assert_eq!(literal(&json!("PT5M"), Some("Edm.Duration"), ODataVersion::V4), "duration'PT5M'");
		// Non-primitive types fall back to the JSON shape
		assert_eq!(literal(&json!("Red"), Some("Trippin.Color"), ODataVersion::V4), "'Red'");
	}

	#[tokio::test]
	async fn test_read_truncates_to_limit() {
		let transport = Arc::new(MockTransport::new().with_json(
			Method::GET,
			"/odata/catalog/Orders?$top=2&$format=json",
			json!({"d": {"results": [{"ID": 1}, {"ID": 2}, {"ID": 3}]}}),
		));
		let connector = connected(transport.clone(), ODataVersion::V2).await;

		let records = connector.read("CatalogService.Orders", 2).await.unwrap();
		assert_eq!(records.len(), 2);
		assert_eq!(transport.requests()[0].destination, "backend");
	}

	#[tokio::test]
	async fn test_create_posts_to_entity_set() {
		let transport = Arc::new(MockTransport::new().with_response(
			Method::POST,
			"/odata/catalog/Orders",
			201,
			json!({"d": {"ID": 9, "OrderNo": "42"}}).to_string(),
		));
		let connector = connected(transport.clone(), ODataVersion::V2).await;

		let created = connector
			.create("Orders", json!({"OrderNo": "42"}))
			.await
			.unwrap();
		assert_eq!(created, json!({"ID": 9, "OrderNo": "42"}));

		let request = &transport.requests()[0].request;
		assert_eq!(request.body, Some(json!({"OrderNo": "42"})));
	}

	#[tokio::test]
	async fn test_v2_invoke_uses_query_options() {
		let transport = Arc::new(MockTransport::new().with_json(
			Method::POST,
			"/odata/catalog/cancelOrder?OrderNo=%2742%27",
			json!({"d": {"ID": 9}}),
		));
		let connector = connected(transport.clone(), ODataVersion::V2).await;

		let operation = OperationDescriptor::new(
			"CatalogService.cancelOrder",
			OperationKind::Action,
			"cancelOrder",
			Method::POST,
		);
		let params = json!({"OrderNo": "42"}).as_object().cloned().unwrap();

		let response = connector.invoke(&operation, &params).await.unwrap();
		assert_eq!(response, json!({"ID": 9}));
	}

	#[tokio::test]
	async fn test_v2_invoke_formats_typed_parameters() {
		let transport = Arc::new(MockTransport::new().with_json(
			Method::POST,
			"/odata/catalog/cancel?ID=guid%277e2b0c1a-5d1f-4c3e-9a4b-0123456789ab%27&Count=3L&Since=datetime%272024-05-01T00%3A00%3A00%27",
			json!({"d": {"cancelled": true}}),
		));
		let connector = connected(transport.clone(), ODataVersion::V2).await;

		let operation = OperationDescriptor::new("CatalogService.cancel", OperationKind::Action, "cancel", Method::POST)
			.with_parameters(vec![
				ParameterDescriptor::new("ID", ParameterLocation::Query, true).with_type("Edm.Guid"),
				ParameterDescriptor::new("Count", ParameterLocation::Query, false).with_type("Edm.Int64"),
				ParameterDescriptor::new("Since", ParameterLocation::Query, false).with_type("Edm.DateTime"),
			]);
		let params = json!({
			"ID": "7e2b0c1a-5d1f-4c3e-9a4b-0123456789ab",
			"Count": 3,
			"Since": "2024-05-01T00:00:00",
		})
		.as_object()
		.cloned()
		.unwrap();

		let response = connector.invoke(&operation, &params).await.unwrap();
		assert_eq!(response["cancelled"], true);
	}

	#[tokio::test]
	async fn test_v4_function_inlines_parameters() {
		let transport = Arc::new(MockTransport::new().with_json(
			Method::GET,
			"/odata/catalog/GetNearestAirport(lat=1.5,lon=2)",
			json!({"IcaoCode": "KSEA"}),
		));
		let connector = connected(transport, ODataVersion::V4).await;

		let operation = OperationDescriptor::new(
			"Trippin.GetNearestAirport",
			OperationKind::Function,
			"GetNearestAirport",
			Method::GET,
		);
		let params = json!({"lat": 1.5, "lon": 2}).as_object().cloned().unwrap();

		let response = connector.invoke(&operation, &params).await.unwrap();
		assert_eq!(response["IcaoCode"], "KSEA");
	}

	#[tokio::test]
	async fn test_v4_action_posts_body() {
		let transport = Arc::new(MockTransport::new().with_response(Method::POST, "/odata/catalog/ResetDataSource", 204, ""));
		let connector = connected(transport.clone(), ODataVersion::V4).await;

		let operation = OperationDescriptor::new(
			"Trippin.ResetDataSource",
			OperationKind::Action,
			"ResetDataSource",
			Method::POST,
		);

		let response = connector.invoke(&operation, &Params::new()).await.unwrap();
		assert_eq!(response, Value::Null);
		assert_eq!(transport.requests()[0].request.body, Some(json!({})));
	}
}
