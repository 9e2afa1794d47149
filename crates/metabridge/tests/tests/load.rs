// Loader runs against live HTTP backends

use std::collections::HashMap;
use std::sync::Arc;

use metabridge::{
	AuthConfig, Destination, FetchError, InvokeOperationHook, LoadReport, LoaderConfig, ODataVersion,
	Params, ProbeOutcome, ReqwestTransport, ServiceDescriptor, ServiceError, ServiceLoader,
	ServiceOutcome, Stage, StaticCatalog,
};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CATALOG_V2: &str = include_str!("../../testdata/catalog_service_v2.xml");
const TRIPPIN_V4: &str = include_str!("../../testdata/trippin_v4.xml");
const PETSTORE: &str = include_str!("../../testdata/petstore.json");

fn transport(server: &MockServer, auth: Option<AuthConfig>) -> Arc<ReqwestTransport> {
	let mut destination = Destination::new(server.uri());
	if let Some(auth) = auth {
		destination = destination.with_auth(auth);
	}
	Arc::new(ReqwestTransport::new(HashMap::from([(
		"backend".to_string(),
		destination,
	)])))
}

async fn mount_get(server: &MockServer, url_path: &str, response: ResponseTemplate) {
	Mock::given(method("GET"))
		.and(path(url_path))
		.respond_with(response)
		.mount(server)
		.await;
}

async fn mount_read(server: &MockServer, url_path: &str, body: serde_json::Value) {
	Mock::given(method("GET"))
		.and(path(url_path))
		.and(query_param("$top", "1"))
		.and(query_param("$format", "json"))
		.respond_with(ResponseTemplate::new(200).set_body_json(body))
		.mount(server)
		.await;
}

fn completed(report: &LoadReport, service: &str) -> bool {
	report.get(service).is_some_and(|s| s.is_completed())
}

#[tokio::test]
async fn test_odata_v2_service() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/odata/v2/catalog/$metadata"))
		.and(header("authorization", "Basic YWxpY2U6c2VjcmV0"))
		.respond_with(ResponseTemplate::new(200).set_body_string(CATALOG_V2))
		.expect(1)
		.mount(&server)
		.await;
	mount_read(
		&server,
		"/odata/v2/catalog/Orders",
		json!({"d": {"results": [{"ID": "7e2b", "OrderNo": "1"}]}}),
	)
	.await;
	mount_read(&server, "/odata/v2/catalog/OrderItems", json!({"d": {"results": []}})).await;
	mount_get(
		&server,
		"/odata/v2/catalog/Products",
		ResponseTemplate::new(500).set_body_string("database offline"),
	)
	.await;

	let auth = AuthConfig::Basic {
		username: "alice".to_string(),
		password: "secret".to_string(),
	};
	let catalog = StaticCatalog::new(vec![ServiceDescriptor::odata(
		"CatalogService",
		"backend",
		"/odata/v2/catalog/",
	)]);
	let loader = ServiceLoader::builder(Arc::new(catalog), transport(&server, Some(auth))).build();

	let report = loader.load_services().await?;
	assert!(completed(&report, "CatalogService"));

	let probe = report.get("CatalogService").and_then(|s| s.probe()).expect("probe report");
	let entities: Vec<_> = probe.entities.iter().map(|e| e.entity.as_str()).collect();
	assert_eq!(
		entities,
		vec!["CatalogService.Orders", "CatalogService.OrderItems", "CatalogService.Products"]
	);
	assert!(matches!(
		&probe.get("CatalogService.Orders").unwrap().outcome,
		ProbeOutcome::Succeeded { records } if records.len() == 1 && records[0]["OrderNo"] == "1"
	));
	assert!(matches!(
		&probe.get("CatalogService.OrderItems").unwrap().outcome,
		ProbeOutcome::Succeeded { records } if records.is_empty()
	));
	assert!(matches!(
		&probe.get("CatalogService.Products").unwrap().outcome,
		ProbeOutcome::Failed { error } if error.to_string().contains("500")
	));

	let connector = loader.registry().get("CatalogService").await.expect("cached connector");
	assert!(connector.is_usable());
	Ok(())
}

#[tokio::test]
async fn test_odata_v4_service() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	mount_get(
		&server,
		"/trippin/$metadata",
		ResponseTemplate::new(200).set_body_string(TRIPPIN_V4),
	)
	.await;
	mount_read(&server, "/trippin/People", json!({"value": [{"UserName": "russellwhyte"}]})).await;
	mount_read(&server, "/trippin/Airports", json!({"value": [{"IcaoCode": "KSFO"}]})).await;
	Mock::given(method("POST"))
		.and(path("/trippin/ResetDataSource"))
		.respond_with(ResponseTemplate::new(204))
		.expect(1)
		.mount(&server)
		.await;

	let catalog = StaticCatalog::new(vec![ServiceDescriptor::odata("Trippin", "backend", "/trippin/")]);
	let loader = ServiceLoader::builder(Arc::new(catalog), transport(&server, None))
		.config(LoaderConfig {
			odata_version: ODataVersion::V4,
			..Default::default()
		})
		.operation_filter(|_, op| op.name() == "ResetDataSource")
		.build();

	let report = loader.load_services().await?;
	let service = report.get("Trippin").expect("service report");
	let ServiceOutcome::Completed { probe, operations, .. } = &service.outcome else {
		panic!("Trippin did not complete: {:?}", service.outcome);
	};

	assert_eq!(probe.succeeded().count(), 2);
	let skipped: Vec<_> = probe.skipped().map(|e| e.entity.as_str()).collect();
	assert_eq!(skipped, vec!["Trippin.Me"]);

	assert_eq!(operations.len(), 1);
	assert_eq!(operations[0].name, "Trippin.ResetDataSource");
	assert!(operations[0].is_success());
	Ok(())
}

#[tokio::test]
async fn test_rest_service_with_hook() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	mount_get(
		&server,
		"/api/v3/openapi.json",
		ResponseTemplate::new(200).set_body_string(PETSTORE),
	)
	.await;
	Mock::given(method("GET"))
		.and(path("/api/v3/pet/findByStatus"))
		.and(query_param("status", "available"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 10, "name": "doggie"}])))
		.expect(1)
		.mount(&server)
		.await;

	let mut params = Params::new();
	params.insert("status".to_string(), json!("available"));
	let catalog = StaticCatalog::new(vec![ServiceDescriptor::rest(
		"Petstore",
		"backend",
		"/api/v3",
		"/api/v3/openapi.json",
	)]);
	let loader = ServiceLoader::builder(Arc::new(catalog), transport(&server, None))
		.hook(Arc::new(
			InvokeOperationHook::new("pet_findByStatus", params).for_service("Petstore"),
		))
		.build();

	let report = loader.load_services().await?;
	let service = report.get("Petstore").expect("service report");
	let ServiceOutcome::Completed { probe, hooks, .. } = &service.outcome else {
		panic!("Petstore did not complete: {:?}", service.outcome);
	};

	// OpenAPI documents yield operations only
	assert!(probe.entities.is_empty());
	assert_eq!(hooks.len(), 1);
	assert_eq!(hooks[0].name, "invoke:pet_findByStatus");
	assert!(hooks[0].is_success());

	let json = serde_json::to_value(&report)?;
	assert_eq!(json["services"][0]["hooks"][0]["response"][0]["name"], "doggie");
	Ok(())
}

#[tokio::test]
async fn test_missing_metadata_fails_only_that_service() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	mount_get(
		&server,
		"/odata/v2/catalog/$metadata",
		ResponseTemplate::new(200).set_body_string(CATALOG_V2),
	)
	.await;

	let catalog = StaticCatalog::new(vec![
		ServiceDescriptor::odata("Retired", "backend", "/odata/v2/retired/"),
		ServiceDescriptor::odata("CatalogService", "backend", "/odata/v2/catalog/"),
	]);
	let loader = ServiceLoader::builder(Arc::new(catalog), transport(&server, None)).build();

	let report = loader.load_services().await?;
	let names: Vec<_> = report.services.iter().map(|s| s.service.as_str()).collect();
	assert_eq!(names, vec!["Retired", "CatalogService"]);

	let retired = report.get("Retired").expect("service report");
	assert!(matches!(
		&retired.outcome,
		ServiceOutcome::Failed {
			stage: Stage::Fetch,
			error: ServiceError::Fetch(FetchError::Status { status: 404, .. }),
		}
	));
	// Probe reads of the healthy service hit unmounted routes and fail individually
	assert!(completed(&report, "CatalogService"));
	assert!(loader.registry().get("Retired").await.is_none());
	Ok(())
}
