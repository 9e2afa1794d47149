// Service catalog boundary
//
// The catalog owns which services exist and whether they are active. This
// module only defines the read-only descriptor shape, the trait the loader
// consumes, and a static in-memory catalog fed from configuration.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::connector::Credentials;
use crate::error::LoadError;

/// Protocol a service speaks and describes itself with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
	/// OData service described by an EDMX `$metadata` document
	OData,
	/// REST service described by an OpenAPI document
	Rest,
}

impl fmt::Display for ServiceKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ServiceKind::OData => f.write_str("odata"),
			ServiceKind::Rest => f.write_str("rest"),
		}
	}
}

/// One externally hosted service, as listed by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
	/// Unique service name
	pub name: String,
	pub kind: ServiceKind,
	/// Named destination resolved by the transport
	pub destination: String,
	/// Service root path relative to the destination
	#[serde(default)]
	pub path: String,
	/// OpenAPI document URL relative to the destination (rest only)
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub openapi: Option<String>,
	#[serde(default = "default_active")]
	pub active: bool,
}

fn default_active() -> bool {
	true
}

impl ServiceDescriptor {
	pub fn odata(name: impl Into<String>, destination: impl Into<String>, path: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			kind: ServiceKind::OData,
			destination: destination.into(),
			path: path.into(),
			openapi: None,
			active: true,
		}
	}

	pub fn rest(
		name: impl Into<String>,
		destination: impl Into<String>,
		path: impl Into<String>,
		openapi: impl Into<String>,
	) -> Self {
		Self {
			name: name.into(),
			kind: ServiceKind::Rest,
			destination: destination.into(),
			path: path.into(),
			openapi: Some(openapi.into()),
			active: true,
		}
	}

	pub fn with_active(mut self, active: bool) -> Self {
		self.active = active;
		self
	}

	/// Credentials a connector for this service is bound to
	pub fn credentials(&self) -> Credentials {
		Credentials {
			destination: self.destination.clone(),
			path: self.path.clone(),
		}
	}
}

/// Read access to the external service catalog
#[async_trait]
pub trait ServiceCatalog: Send + Sync {
	/// List every descriptor with `active == true`
	async fn list_active(&self) -> Result<Vec<ServiceDescriptor>, LoadError>;
}

/// Catalog backed by a fixed list of descriptors
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
	services: Vec<ServiceDescriptor>,
}

impl StaticCatalog {
	pub fn new(services: Vec<ServiceDescriptor>) -> Self {
		Self { services }
	}

	pub fn len(&self) -> usize {
		self.services.len()
	}

	pub fn is_empty(&self) -> bool {
		self.services.is_empty()
	}
}

#[async_trait]
impl ServiceCatalog for StaticCatalog {
	async fn list_active(&self) -> Result<Vec<ServiceDescriptor>, LoadError> {
		let mut seen = HashSet::new();
		for service in &self.services {
			if !seen.insert(service.name.as_str()) {
				return Err(LoadError::CatalogUnavailable(format!(
					"duplicate service name '{}'",
					service.name
				)));
			}
		}

		Ok(self.services.iter().filter(|s| s.active).cloned().collect())
	}
}
