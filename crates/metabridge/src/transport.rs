// HTTP transport boundary
//
// Destination resolution and the wire call itself live behind `HttpTransport`.
// `ReqwestTransport` is the production implementation; retries are not done
// here or anywhere else in the pipeline.

use std::collections::HashMap;

use async_trait::async_trait;
use http::Method;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

/// Errors raised by the transport itself (not by non-2xx responses)
#[derive(Error, Debug)]
pub enum TransportError {
	#[error("unknown destination '{0}'")]
	UnknownDestination(String),

	#[error("invalid URL '{url}': {message}")]
	InvalidUrl { url: String, message: String },

	#[error("HTTP request failed: {0}")]
	Request(String),
}

/// A request relative to a destination
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
	pub method: Method,
	/// Path and query, relative to the destination URL
	pub url: String,
	/// Extra headers, sent after the destination's auth header
	pub headers: Vec<(String, String)>,
	pub body: Option<serde_json::Value>,
}

impl HttpRequest {
	pub fn new(method: Method, url: impl Into<String>) -> Self {
		Self {
			method,
			url: url.into(),
			headers: Vec::new(),
			body: None,
		}
	}

	pub fn get(url: impl Into<String>) -> Self {
		Self::new(Method::GET, url)
	}

	pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
		Self::new(Method::POST, url).with_body(body)
	}

	pub fn with_body(mut self, body: serde_json::Value) -> Self {
		self.body = Some(body);
		self
	}

	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));
		self
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
	pub status: u16,
	pub body: String,
}

impl HttpResponse {
	pub fn new(status: u16, body: impl Into<String>) -> Self {
		Self {
			status,
			body: body.into(),
		}
	}

	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Outbound HTTP collaborator
#[async_trait]
pub trait HttpTransport: Send + Sync {
	/// Establish (or validate) a session to a named destination
	async fn connect(&self, destination: &str) -> Result<(), TransportError>;

	/// Send a request to a named destination
	async fn send(&self, destination: &str, request: HttpRequest) -> Result<HttpResponse, TransportError>;

	async fn get(&self, destination: &str, url: &str) -> Result<HttpResponse, TransportError> {
		self.send(destination, HttpRequest::get(url)).await
	}
}

/// Authentication configuration for a destination
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
	/// Bearer token authentication
	Bearer { token: String },
	/// Basic authentication (username:password)
	Basic { username: String, password: String },
}

impl AuthConfig {
	/// Convert to HTTP Authorization header value
	pub fn to_header_value(&self) -> String {
		match self {
			AuthConfig::Bearer { token } => format!("Bearer {}", token),
			AuthConfig::Basic { username, password } => {
				let credentials = base64::Engine::encode(
					&base64::engine::general_purpose::STANDARD,
					format!("{}:{}", username, password),
				);
				format!("Basic {}", credentials)
			},
		}
	}
}

/// Named external target: base URL plus auth
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Destination {
	pub url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub auth: Option<AuthConfig>,
}

impl Destination {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			auth: None,
		}
	}

	pub fn with_auth(mut self, auth: AuthConfig) -> Self {
		self.auth = Some(auth);
		self
	}
}

/// Join a destination base URL with a relative request URL.
/// Absolute request URLs are returned unchanged.
pub fn join_url(base: &str, url: &str) -> String {
	if url.starts_with("http://") || url.starts_with("https://") {
		return url.to_string();
	}
	if url.is_empty() {
		return base.to_string();
	}
	format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
}

/// Transport backed by `reqwest`, resolving destinations from a static map
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
	client: reqwest::Client,
	destinations: HashMap<String, Destination>,
}

impl ReqwestTransport {
	pub fn new(destinations: HashMap<String, Destination>) -> Self {
		Self {
			client: reqwest::Client::new(),
			destinations,
		}
	}

	pub fn with_client(mut self, client: reqwest::Client) -> Self {
		self.client = client;
		self
	}

	fn resolve(&self, destination: &str) -> Result<&Destination, TransportError> {
		self.destinations
			.get(destination)
			.ok_or_else(|| TransportError::UnknownDestination(destination.to_string()))
	}
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
	async fn connect(&self, destination: &str) -> Result<(), TransportError> {
		let target = self.resolve(destination)?;
		target
			.url
			.parse::<http::Uri>()
			.map_err(|e| TransportError::InvalidUrl {
				url: target.url.clone(),
				message: e.to_string(),
			})?;
		debug!(target: "metabridge", destination, url = %target.url, "destination resolved");
		Ok(())
	}

	async fn send(&self, destination: &str, request: HttpRequest) -> Result<HttpResponse, TransportError> {
		let target = self.resolve(destination)?;
		let url = join_url(&target.url, &request.url);
		trace!(target: "metabridge", destination, method = %request.method, %url, "sending request");

		// Build the request
		let mut builder = self.client.request(request.method, &url);
		if let Some(auth) = &target.auth {
			builder = builder.header(http::header::AUTHORIZATION, auth.to_header_value());
		}
		for (name, value) in &request.headers {
			builder = builder.header(name.as_str(), value.as_str());
		}
		if let Some(body) = &request.body {
			let payload = serde_json::to_string(body).map_err(|e| TransportError::Request(e.to_string()))?;
			builder = builder
				.header(http::header::CONTENT_TYPE, "application/json")
				.body(payload);
		}

		// Execute the request
		let response = builder
			.send()
			.await
			.map_err(|e| TransportError::Request(e.to_string()))?;
		let status = response.status().as_u16();

		let body = response
			.text()
			.await
			.map_err(|e| TransportError::Request(format!("failed to read response body: {}", e)))?;

		Ok(HttpResponse { status, body })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_join_url() {
		assert_eq!(
			join_url("http://localhost:4004", "/odata/v2/catalog/$metadata"),
			"http://localhost:4004/odata/v2/catalog/$metadata"
		);
		assert_eq!(
			join_url("http://localhost:4004/", "odata/v2/catalog/"),
			"http://localhost:4004/odata/v2/catalog/"
		);
		assert_eq!(
			join_url("http://localhost:4004", "https://petstore3.swagger.io/api/v3/openapi.json"),
			"https://petstore3.swagger.io/api/v3/openapi.json"
		);
		assert_eq!(join_url("http://localhost:4004", ""), "http://localhost:4004");
	}

	#[test]
	fn test_auth_config_bearer() {
		let auth = AuthConfig::Bearer {
			token: "my-token".to_string(),
		};
		assert_eq!(auth.to_header_value(), "Bearer my-token");
	}

	#[test]
	fn test_auth_config_basic() {
		let auth = AuthConfig::Basic {
			username: "user".to_string(),
			password: "pass".to_string(),
		};
		// base64("user:pass") = "dXNlcjpwYXNz"
		assert_eq!(auth.to_header_value(), "Basic dXNlcjpwYXNz");
	}

	#[test]
	fn test_destination_deserialize() {
		let destination: Destination = serde_yaml::from_str(
			r#"
url: https://backend.example.com
auth:
  type: basic
  username: alice
  password: secret
"#,
		)
		.unwrap();
		assert_eq!(destination.url, "https://backend.example.com");
		assert!(matches!(destination.auth, Some(AuthConfig::Basic { ref username, .. }) if username == "alice"));
	}

	#[tokio::test]
	async fn test_connect_unknown_destination() {
		let transport = ReqwestTransport::new(HashMap::new());
		let err = transport.connect("missing").await.unwrap_err();
		assert!(matches!(err, TransportError::UnknownDestination(name) if name == "missing"));
	}

	#[tokio::test]
	async fn test_connect_known_destination() {
		let transport = ReqwestTransport::new(HashMap::from([(
			"backend".to_string(),
			Destination::new("http://localhost:4004"),
		)]));
		transport.connect("backend").await.unwrap();
	}
}
