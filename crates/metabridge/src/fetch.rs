// Metadata fetcher
//
// Retrieves the raw description document for one service: the EDMX
// `$metadata` document for OData services, the OpenAPI document for REST.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::catalog::{ServiceDescriptor, ServiceKind};
use crate::error::FetchError;
use crate::transport::HttpTransport;

/// Raw metadata document, tagged with its format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawDocument {
	Edmx(String),
	OpenApi(String),
}

impl RawDocument {
	pub fn as_str(&self) -> &str {
		match self {
			RawDocument::Edmx(body) | RawDocument::OpenApi(body) => body,
		}
	}

	pub fn format(&self) -> &'static str {
		match self {
			RawDocument::Edmx(_) => "EDMX",
			RawDocument::OpenApi(_) => "OpenAPI",
		}
	}
}

/// Fetches metadata documents through the transport. Never retries.
#[derive(Clone)]
pub struct MetadataFetcher {
	transport: Arc<dyn HttpTransport>,
}

impl MetadataFetcher {
	pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
		Self { transport }
	}

	/// URL of the metadata document, relative to the service's destination
	pub fn metadata_url(descriptor: &ServiceDescriptor) -> Result<String, FetchError> {
		match descriptor.kind {
			ServiceKind::OData => Ok(format!("{}$metadata", descriptor.path)),
			ServiceKind::Rest => descriptor
				.openapi
				.clone()
				.ok_or_else(|| FetchError::MissingOpenApiUrl(descriptor.name.clone())),
		}
	}

	pub async fn fetch(&self, descriptor: &ServiceDescriptor) -> Result<RawDocument, FetchError> {
		if !descriptor.active {
			return Err(FetchError::Inactive(descriptor.name.clone()));
		}

		let url = Self::metadata_url(descriptor)?;
		debug!(
			target: "metabridge",
			service = %descriptor.name,
			destination = %descriptor.destination,
			%url,
			"fetching metadata"
		);

		let response = self.transport.get(&descriptor.destination, &url).await?;
		if !response.is_success() {
			return Err(FetchError::status(url, response.status));
		}
		if response.body.trim().is_empty() {
			return Err(FetchError::EmptyBody(url));
		}

		trace!(target: "metabridge", service = %descriptor.name, body = %response.body, "metadata document");

		Ok(match descriptor.kind {
			ServiceKind::OData => RawDocument::Edmx(response.body),
			ServiceKind::Rest => RawDocument::OpenApi(response.body),
		})
	}
}
