// OpenAPI compiler
//
// Maps every path item operation of an OpenAPI 3.x document to an operation
// descriptor. REST documents describe no entity sets, so the resulting schema
// carries operations only.

use std::collections::HashSet;

use http::Method;
use indexmap::IndexMap;
use openapiv3::{OpenAPI, Parameter, ParameterSchemaOrContent, ReferenceOr, SchemaKind, Type};
use serde_json::Value;

use crate::catalog::ServiceKind;
use crate::error::CompileError;
use crate::schema::{
	CanonicalSchema, OPENAPI_METHOD, OPENAPI_OPERATION_ID, OPENAPI_PATH, OPENAPI_SUMMARY,
	OperationDescriptor, OperationKind, ParameterDescriptor, ParameterLocation,
};

const DEFAULT_NAMESPACE: &str = "RestService";

pub(super) fn compile(document: &str) -> Result<CanonicalSchema, CompileError> {
	let raw: Value = serde_json::from_str(document)?;
	let version = raw
		.get("openapi")
		.or_else(|| raw.get("swagger"))
		.and_then(Value::as_str)
		.unwrap_or("unknown");
	if !version.starts_with("3.") || raw.get("openapi").is_none() {
		return Err(CompileError::UnsupportedVersion(version.to_string()));
	}

	let api: OpenAPI = serde_json::from_value(raw)?;
	let namespace = namespace_from_title(&api.info.title);
	let shared_parameters = api
		.components
		.as_ref()
		.map(|c| &c.parameters);

	let mut builder = CanonicalSchema::builder(namespace.clone(), ServiceKind::Rest);
	let mut taken = HashSet::new();
	for (path, item) in &api.paths.paths {
		let item = match item {
			ReferenceOr::Item(item) => item,
			ReferenceOr::Reference { reference } => {
				return Err(CompileError::UnresolvedReference(reference.clone()));
			},
		};

		let operation_count = item.iter().count();
		let base_name = operation_name(path);

		for (method_name, operation) in item.iter() {
			let method = Method::from_bytes(method_name.to_ascii_uppercase().as_bytes())
				.map_err(|_| CompileError::InvalidMethod(method_name.to_string()))?;
			let (kind, name) = if method == Method::GET {
				(OperationKind::Function, base_name.clone())
			} else if operation_count > 1 {
				(OperationKind::Action, format!("{}_{}", base_name, method_name))
			} else {
				(OperationKind::Action, base_name.clone())
			};
			let name = unique_name(&mut taken, name, method_name);

			// Operation-level parameters override path-level ones with the same name and location
			let mut parameters: IndexMap<(String, ParameterLocation), ParameterDescriptor> = IndexMap::new();
			for parameter in item.parameters.iter().chain(operation.parameters.iter()) {
				let parameter = resolve_parameter(parameter, shared_parameters)?;
				parameters.insert((parameter.name.clone(), parameter.location), parameter);
			}

			let mut descriptor = OperationDescriptor::new(
				format!("{}.{}", namespace, name),
				kind,
				path.clone(),
				method.clone(),
			)
			.with_parameters(parameters.into_values().collect())
			.with_annotation(OPENAPI_PATH, Value::String(path.clone()))
			.with_annotation(OPENAPI_METHOD, Value::String(method.to_string()));
			if let Some(operation_id) = &operation.operation_id {
				descriptor = descriptor.with_annotation(OPENAPI_OPERATION_ID, Value::String(operation_id.clone()));
			}
			if let Some(summary) = &operation.summary {
				descriptor = descriptor.with_annotation(OPENAPI_SUMMARY, Value::String(summary.clone()));
			}

			builder = builder.operation(descriptor);
		}
	}

	builder.build()
}

/// Leading alphanumeric words of the title, joined with `.`
fn namespace_from_title(title: &str) -> String {
	let words: Vec<_> = title
		.split_whitespace()
		.take_while(|word| word.chars().all(|c| c.is_ascii_alphanumeric()))
		.collect();
	if words.is_empty() {
		DEFAULT_NAMESPACE.to_string()
	} else {
		words.join(".")
	}
}

/// `/pet/{petId}/uploadImage` -> `pet_petId_uploadImage`; `/` -> `root`
fn operation_name(path: &str) -> String {
	let segments: Vec<_> = path
		.split('/')
		.filter(|s| !s.is_empty())
		.map(|s| s.trim_start_matches('{').trim_end_matches('}'))
		.collect();
	if segments.is_empty() {
		"root".to_string()
	} else {
		segments.join("_")
	}
}

/// Distinct paths can derive the same name (`/items` and `/items/`, or
/// `/pet` POST and `/pet/post` GET). Later clashes get the method appended,
/// then a counter. Paths are visited in document order, so the result is stable.
fn unique_name(taken: &mut HashSet<String>, name: String, method: &str) -> String {
	if taken.insert(name.clone()) {
		return name;
	}
	let with_method = format!("{}_{}", name, method);
	if taken.insert(with_method.clone()) {
		return with_method;
	}
	let mut counter = 2;
	loop {
		let candidate = format!("{}_{}", with_method, counter);
		if taken.insert(candidate.clone()) {
			return candidate;
		}
		counter += 1;
	}
}

fn resolve_parameter(
	parameter: &ReferenceOr<Parameter>,
	shared: Option<&IndexMap<String, ReferenceOr<Parameter>>>,
) -> Result<ParameterDescriptor, CompileError> {
	let parameter = match parameter {
		ReferenceOr::Item(parameter) => parameter,
		ReferenceOr::Reference { reference } => {
			let resolved = reference
				.strip_prefix("#/components/parameters/")
				.and_then(|name| shared?.get(name));
			match resolved {
				Some(ReferenceOr::Item(parameter)) => parameter,
				_ => return Err(CompileError::UnresolvedReference(reference.clone())),
			}
		},
	};

	let (data, location) = match parameter {
		Parameter::Query { parameter_data, .. } => (parameter_data, ParameterLocation::Query),
		Parameter::Path { parameter_data, .. } => (parameter_data, ParameterLocation::Path),
		Parameter::Header { parameter_data, .. } => (parameter_data, ParameterLocation::Header),
		Parameter::Cookie { parameter_data, .. } => (parameter_data, ParameterLocation::Cookie),
	};

	// Path parameters are always required, whatever the document says
	let required = data.required || location == ParameterLocation::Path;
	let mut descriptor = ParameterDescriptor::new(data.name.clone(), location, required);
	if let Some(type_name) = schema_type(&data.format) {
		descriptor = descriptor.with_type(type_name);
	}
	Ok(descriptor)
}

fn schema_type(format: &ParameterSchemaOrContent) -> Option<&'static str> {
	let ParameterSchemaOrContent::Schema(ReferenceOr::Item(schema)) = format else {
		return None;
	};
	let SchemaKind::Type(schema_type) = &schema.schema_kind else {
		return None;
	};
	Some(match schema_type {
		Type::String { .. } => "string",
		Type::Number { .. } => "number",
		Type::Integer { .. } => "integer",
		Type::Boolean { .. } => "boolean",
		Type::Array { .. } => "array",
		Type::Object { .. } => "object",
	})
}
