// Loads driven entirely from a configuration file

use std::sync::Arc;
use std::time::Duration;

use metabridge::{Config, ConfigError, ServiceLoader};
use tempfile::NamedTempFile;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CATALOG_V2: &str = include_str!("../../testdata/catalog_service_v2.xml");

fn write_config(content: &str) -> anyhow::Result<NamedTempFile> {
	let file = NamedTempFile::with_suffix(".yaml")?;
	std::fs::write(file.path(), content)?;
	Ok(file)
}

#[tokio::test]
async fn test_load_from_config_file() -> anyhow::Result<()> {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/odata/v2/catalog/$metadata"))
		.respond_with(ResponseTemplate::new(200).set_body_string(CATALOG_V2))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/odata/v2/catalog/Orders"))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"d": {"results": []}})))
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path("/odata/v2/catalog/Orders"))
		.respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"d": {"OrderNo": "42"}})))
		.expect(1)
		.mount(&server)
		.await;

	let file = write_config(&format!(
		r#"
loader:
  workers: 2
  timeout: 30s
destinations:
  backend:
    url: {}
services:
  - name: CatalogService
    kind: odata
    destination: backend
    path: /odata/v2/catalog/
  - name: Legacy
    kind: odata
    destination: backend
    path: /odata/v2/legacy/
    active: false
hooks:
  - type: create
    service: CatalogService
    entity: Orders
    payload:
      OrderNo: "42"
"#,
		server.uri()
	))?;

	let config = Config::load(file.path()).await?;
	assert_eq!(config.loader.timeout, Some(Duration::from_secs(30)));

	let loader = ServiceLoader::builder(Arc::new(config.catalog()), Arc::new(config.transport()))
		.config(config.loader.clone())
		.hooks(config.post_connect_hooks())
		.build();
	let report = loader.load_services().await?;

	assert_eq!(report.len(), 1);
	assert!(!report.cancelled);

	let json = serde_json::to_value(&report)?;
	let service = &json["services"][0];
	assert_eq!(service["service"], "CatalogService");
	assert_eq!(service["kind"], "odata");
	assert_eq!(service["status"], "completed");
	assert_eq!(service["hooks"][0]["name"], "create:Orders");
	assert_eq!(service["hooks"][0]["status"], "succeeded");
	assert_eq!(service["hooks"][0]["response"]["created"]["OrderNo"], "42");
	Ok(())
}

#[tokio::test]
async fn test_invalid_config_file() -> anyhow::Result<()> {
	let file = write_config(
		r#"
services:
  - name: CatalogService
    kind: odata
    destination: nowhere
"#,
	)?;

	let err = Config::load(file.path()).await.unwrap_err();
	assert!(matches!(err, ConfigError::UnknownDestination { .. }));
	Ok(())
}
