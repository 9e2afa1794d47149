// Schema compilers
//
// Turn a raw metadata document into a `CanonicalSchema`. Both variants are
// pure functions of their input: no network, no shared state, and identical
// documents always compile to structurally identical schemas.

mod edmx;
mod openapi;

use serde::{Deserialize, Serialize};

use crate::catalog::{ServiceDescriptor, ServiceKind};
use crate::error::CompileError;
use crate::fetch::RawDocument;
use crate::schema::CanonicalSchema;

/// OData protocol version of an EDMX document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum ODataVersion {
	#[default]
	V2,
	V4,
}

/// Compiler variant, selected by the service kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaCompiler {
	OData { version: ODataVersion },
	OpenApi,
}

impl SchemaCompiler {
	pub fn for_kind(kind: ServiceKind, odata_version: ODataVersion) -> Self {
		match kind {
			ServiceKind::OData => SchemaCompiler::OData {
				version: odata_version,
			},
			ServiceKind::Rest => SchemaCompiler::OpenApi,
		}
	}

	pub fn for_descriptor(descriptor: &ServiceDescriptor, odata_version: ODataVersion) -> Self {
		Self::for_kind(descriptor.kind, odata_version)
	}

	/// Compile a document. `service_name` names the OData service namespace;
	/// OpenAPI documents carry their own (derived from `info.title`).
	pub fn compile(&self, service_name: &str, document: &RawDocument) -> Result<CanonicalSchema, CompileError> {
		match (self, document) {
			(SchemaCompiler::OData { version }, RawDocument::Edmx(xml)) => edmx::compile(xml, service_name, *version),
			(SchemaCompiler::OpenApi, RawDocument::OpenApi(json)) => openapi::compile(json),
			(SchemaCompiler::OData { .. }, other) => Err(CompileError::DocumentMismatch {
				compiler: "OData",
				document: other.format(),
			}),
			(SchemaCompiler::OpenApi, other) => Err(CompileError::DocumentMismatch {
				compiler: "OpenAPI",
				document: other.format(),
			}),
		}
	}
}
