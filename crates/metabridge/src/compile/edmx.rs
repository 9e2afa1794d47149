// EDMX compiler
//
// Streams the document with quick-xml into a small intermediate model, then
// resolves entity sets, singletons, associations and operation imports
// against it. Element and attribute names are matched on their local part,
// so namespace prefixes (`edmx:`, `m:`, `sap:`) do not matter.

use std::collections::HashMap;

use http::Method;
use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_json::Value;
use tracing::warn;

use super::ODataVersion;
use crate::catalog::ServiceKind;
use crate::error::CompileError;
use crate::schema::{
	AssociationDescriptor, AssociationEnd, CanonicalSchema, EntityDescriptor, NavigationDescriptor,
	ODATA_ENTITY_SET, ODATA_ENTITY_TYPE, ODATA_HTTP_METHOD, ODATA_RETURN_TYPE, OperationDescriptor,
	OperationKind, ParameterDescriptor, ParameterLocation, PropertyDescriptor,
};

pub(super) fn compile(xml: &str, service_name: &str, version: ODataVersion) -> Result<CanonicalSchema, CompileError> {
	let model = parse(xml)?;

	let Some(document_version) = model.version else {
		return Err(CompileError::MissingElement("Edmx"));
	};
	if document_version != version {
		warn!(
			target: "metabridge",
			service = service_name,
			configured = ?version,
			document = ?document_version,
			"EDMX version differs from configured OData version"
		);
	}
	if model.namespaces.is_empty() {
		return Err(CompileError::MissingElement("Schema"));
	}
	if model.containers.is_empty() {
		return Err(CompileError::MissingElement("EntityContainer"));
	}

	let mut builder = CanonicalSchema::builder(service_name, ServiceKind::OData);

	for container in &model.containers {
		for set in &container.entity_sets {
			let (qualified_type, def) =
				model
					.resolve_type(&set.entity_type)
					.ok_or_else(|| CompileError::UnknownEntityType {
						set: set.name.clone(),
						entity_type: set.entity_type.clone(),
					})?;
			builder = builder.entity(model.entity(service_name, &set.name, qualified_type, def));
		}

		for singleton in &container.singletons {
			let (qualified_type, def) =
				model
					.resolve_type(&singleton.entity_type)
					.ok_or_else(|| CompileError::UnknownEntityType {
						set: singleton.name.clone(),
						entity_type: singleton.entity_type.clone(),
					})?;
			builder = builder.entity(
				model
					.entity(service_name, &singleton.name, qualified_type, def)
					.singleton(),
			);
		}

		for import in &container.imports {
			builder = builder.operation(model.operation(service_name, import)?);
		}
	}

	for association in model.associations(service_name) {
		builder = builder.association(association);
	}

	builder.build()
}

#[derive(Debug)]
struct EntityTypeDef {
	name: String,
	keys: Vec<String>,
	properties: Vec<PropertyDescriptor>,
	navigation: Vec<NavigationDef>,
}

#[derive(Debug)]
struct NavigationDef {
	name: String,
	/// V2: qualified association name
	relationship: Option<String>,
	/// V2: role of the target end
	to_role: Option<String>,
	/// V4: target type, possibly `Collection(...)`
	target_type: Option<String>,
}

#[derive(Debug)]
struct AssociationDef {
	qualified_name: String,
	name: String,
	ends: Vec<AssociationEnd>,
}

#[derive(Debug)]
struct EntitySetDef {
	name: String,
	entity_type: String,
}

#[derive(Debug)]
struct OperationImport {
	name: String,
	is_action: bool,
	http_method: Option<String>,
	return_type: Option<String>,
	/// V4: qualified name of the imported Function/Action
	target: Option<String>,
	parameters: Vec<ParameterDescriptor>,
}

#[derive(Debug, Default)]
struct OperationDef {
	is_bound: bool,
	parameters: Vec<ParameterDescriptor>,
	return_type: Option<String>,
}

#[derive(Debug, Default)]
struct ContainerDef {
	entity_sets: Vec<EntitySetDef>,
	singletons: Vec<EntitySetDef>,
	imports: Vec<OperationImport>,
}

#[derive(Debug, Default)]
struct EdmxModel {
	version: Option<ODataVersion>,
	namespaces: Vec<String>,
	/// Alias -> namespace
	aliases: HashMap<String, String>,
	/// Qualified type name -> definition, in document order
	entity_types: IndexMap<String, EntityTypeDef>,
	associations: Vec<AssociationDef>,
	operation_defs: HashMap<String, OperationDef>,
	containers: Vec<ContainerDef>,
}

impl EdmxModel {
	/// Replace a leading alias with its namespace
	fn qualify(&self, name: &str) -> String {
		match name.rsplit_once('.') {
			Some((prefix, local)) => match self.aliases.get(prefix) {
				Some(namespace) => format!("{}.{}", namespace, local),
				None => name.to_string(),
			},
			None => name.to_string(),
		}
	}

	fn resolve_type(&self, name: &str) -> Option<(&str, &EntityTypeDef)> {
		self.entity_types
			.get_key_value(&self.qualify(name))
			.map(|(k, v)| (k.as_str(), v))
	}

	fn entity(&self, service: &str, set: &str, qualified_type: &str, def: &EntityTypeDef) -> EntityDescriptor {
		let navigation = def
			.navigation
			.iter()
			.filter_map(|nav| self.navigation(service, def, nav))
			.collect();

		EntityDescriptor::new(format!("{}.{}", service, set), set)
			.with_entity_type(qualified_type)
			.with_keys(def.keys.clone())
			.with_properties(def.properties.clone())
			.with_navigation(navigation)
			.with_annotation(ODATA_ENTITY_SET, Value::String(set.to_string()))
			.with_annotation(ODATA_ENTITY_TYPE, Value::String(qualified_type.to_string()))
	}

	fn navigation(&self, service: &str, def: &EntityTypeDef, nav: &NavigationDef) -> Option<NavigationDescriptor> {
		if let Some(target_type) = &nav.target_type {
			let (to_many, element) = collection_element(target_type);
			return Some(NavigationDescriptor {
				name: nav.name.clone(),
				target: self.qualify(element),
				to_many,
				association: Some(format!("{}.{}_{}", service, def.name, nav.name)),
			});
		}

		let relationship = self.qualify(nav.relationship.as_deref()?);
		let to_role = nav.to_role.as_deref()?;
		let association = self
			.associations
			.iter()
			.find(|a| a.qualified_name == relationship)?;
		let end = association.ends.iter().find(|e| e.role == to_role)?;

		Some(NavigationDescriptor {
			name: nav.name.clone(),
			target: end.entity_type.clone(),
			to_many: end.multiplicity == "*",
			association: Some(format!("{}.{}", service, association.name)),
		})
	}

	fn associations(&self, service: &str) -> Vec<AssociationDescriptor> {
		// V2 declares associations explicitly
		let mut associations: Vec<_> = self
			.associations
			.iter()
			.map(|a| AssociationDescriptor::new(format!("{}.{}", service, a.name), a.ends.clone()))
			.collect();

		// V4 carries them on typed navigation properties
		for (qualified_type, def) in &self.entity_types {
			for nav in &def.navigation {
				let Some(target_type) = &nav.target_type else {
					continue;
				};
				let (to_many, element) = collection_element(target_type);
				associations.push(AssociationDescriptor::new(
					format!("{}.{}_{}", service, def.name, nav.name),
					vec![
						AssociationEnd::new(def.name.clone(), qualified_type.clone(), "1"),
						AssociationEnd::new(
							nav.name.clone(),
							self.qualify(element),
							if to_many { "*" } else { "0..1" },
						),
					],
				));
			}
		}

		associations
	}

	fn operation(&self, service: &str, import: &OperationImport) -> Result<OperationDescriptor, CompileError> {
		let (kind, method) = if import.is_action {
			(OperationKind::Action, Method::POST)
		} else {
			match import.http_method.as_deref() {
				None => (OperationKind::Function, Method::GET),
				Some(raw) => {
					let method = Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
						.map_err(|_| CompileError::InvalidMethod(raw.to_string()))?;
					let kind = if method == Method::GET {
						OperationKind::Function
					} else {
						OperationKind::Action
					};
					(kind, method)
				},
			}
		};

		let def = import
			.target
			.as_deref()
			.and_then(|target| self.operation_defs.get(&self.qualify(target)));

		let parameters = match def {
			Some(def) if import.parameters.is_empty() => {
				let skip = usize::from(def.is_bound);
				def.parameters.iter().skip(skip).cloned().collect()
			},
			_ => import.parameters.clone(),
		};
		let return_type = import
			.return_type
			.clone()
			.or_else(|| def.and_then(|d| d.return_type.clone()));

		let mut operation = OperationDescriptor::new(
			format!("{}.{}", service, import.name),
			kind,
			import.name.clone(),
			method.clone(),
		)
		.with_parameters(parameters)
		.with_annotation(ODATA_HTTP_METHOD, Value::String(method.to_string()));
		if let Some(return_type) = return_type {
			operation = operation.with_annotation(ODATA_RETURN_TYPE, Value::String(return_type));
		}
		Ok(operation)
	}
}

/// Split `Collection(T)` into (true, T); plain types return (false, T)
fn collection_element(type_name: &str) -> (bool, &str) {
	match type_name
		.strip_prefix("Collection(")
		.and_then(|t| t.strip_suffix(')'))
	{
		Some(inner) => (true, inner),
		None => (false, type_name),
	}
}

struct Attributes(HashMap<String, String>);

impl Attributes {
	fn parse(element: &BytesStart<'_>) -> Result<Self, CompileError> {
		let mut map = HashMap::new();
		for attr in element.attributes() {
			let attr = attr.map_err(|e| CompileError::Xml(e.to_string()))?;
			let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
			let value = attr
				.unescape_value()
				.map_err(|e| CompileError::Xml(e.to_string()))?
				.into_owned();
			map.insert(key, value);
		}
		Ok(Self(map))
	}

	fn get(&self, name: &str) -> Option<&str> {
		self.0.get(name).map(String::as_str)
	}

	fn owned(&self, name: &str) -> Option<String> {
		self.0.get(name).cloned()
	}

	fn require(&self, element: &str, name: &str) -> Result<String, CompileError> {
		self.owned(name)
			.ok_or_else(|| CompileError::missing_attribute(element, name))
	}

	fn is_true(&self, name: &str) -> bool {
		self.get(name) == Some("true")
	}

	fn is_false(&self, name: &str) -> bool {
		self.get(name) == Some("false")
	}
}

/// Event-driven builder of the intermediate model
#[derive(Debug, Default)]
struct EdmxParser {
	model: EdmxModel,
	namespace: Option<String>,
	entity_type: Option<EntityTypeDef>,
	complex_depth: usize,
	association: Option<AssociationDef>,
	container: Option<ContainerDef>,
	import: Option<OperationImport>,
	operation_def: Option<(String, OperationDef)>,
}

impl EdmxParser {
	fn qualified(&self, name: &str) -> String {
		match &self.namespace {
			Some(namespace) => format!("{}.{}", namespace, name),
			None => name.to_string(),
		}
	}

	fn open(&mut self, element: &BytesStart<'_>) -> Result<(), CompileError> {
		match element.local_name().as_ref() {
			b"Edmx" => {
				let attrs = Attributes::parse(element)?;
				let version = match attrs.get("Version") {
					Some(v) if v.starts_with('4') => ODataVersion::V4,
					_ => ODataVersion::V2,
				};
				self.model.version = Some(version);
			},
			b"Schema" => {
				let attrs = Attributes::parse(element)?;
				let namespace = attrs.require("Schema", "Namespace")?;
				if let Some(alias) = attrs.owned("Alias") {
					self.model.aliases.insert(alias, namespace.clone());
				}
				self.model.namespaces.push(namespace.clone());
				self.namespace = Some(namespace);
			},
			b"EntityType" => {
				let attrs = Attributes::parse(element)?;
				self.entity_type = Some(EntityTypeDef {
					name: attrs.require("EntityType", "Name")?,
					keys: Vec::new(),
					properties: Vec::new(),
					navigation: Vec::new(),
				});
			},
			b"ComplexType" => self.complex_depth += 1,
			b"PropertyRef" => {
				if let Some(entity_type) = self.entity_type.as_mut() {
					let attrs = Attributes::parse(element)?;
					entity_type.keys.push(attrs.require("PropertyRef", "Name")?);
				}
			},
			b"Property" if self.complex_depth == 0 => {
				if let Some(entity_type) = self.entity_type.as_mut() {
					let attrs = Attributes::parse(element)?;
					entity_type.properties.push(PropertyDescriptor::new(
						attrs.require("Property", "Name")?,
						attrs.require("Property", "Type")?,
						!attrs.is_false("Nullable"),
					));
				}
			},
			b"NavigationProperty" => {
				if let Some(entity_type) = self.entity_type.as_mut() {
					let attrs = Attributes::parse(element)?;
					entity_type.navigation.push(NavigationDef {
						name: attrs.require("NavigationProperty", "Name")?,
						relationship: attrs.owned("Relationship"),
						to_role: attrs.owned("ToRole"),
						target_type: attrs.owned("Type"),
					});
				}
			},
			b"Association" => {
				let attrs = Attributes::parse(element)?;
				let name = attrs.require("Association", "Name")?;
				self.association = Some(AssociationDef {
					qualified_name: self.qualified(&name),
					name,
					ends: Vec::new(),
				});
			},
			b"End" => {
				// AssociationSet ends carry EntitySet instead of Type and are ignored
				if let Some(association) = self.association.as_mut() {
					let attrs = Attributes::parse(element)?;
					association.ends.push(AssociationEnd::new(
						attrs.require("End", "Role")?,
						attrs.require("End", "Type")?,
						attrs.owned("Multiplicity").unwrap_or_else(|| "1".to_string()),
					));
				}
			},
			b"EntityContainer" => self.container = Some(ContainerDef::default()),
			b"EntitySet" | b"Singleton" => {
				if let Some(container) = self.container.as_mut() {
					let attrs = Attributes::parse(element)?;
					if element.local_name().as_ref() == b"EntitySet" {
						container.entity_sets.push(EntitySetDef {
							name: attrs.require("EntitySet", "Name")?,
							entity_type: attrs.require("EntitySet", "EntityType")?,
						});
					} else {
						container.singletons.push(EntitySetDef {
							name: attrs.require("Singleton", "Name")?,
							entity_type: attrs.require("Singleton", "Type")?,
						});
					}
				}
			},
			b"FunctionImport" | b"ActionImport" => {
				let attrs = Attributes::parse(element)?;
				let is_action = element.local_name().as_ref() == b"ActionImport";
				let element_name = if is_action { "ActionImport" } else { "FunctionImport" };
				self.import = Some(OperationImport {
					name: attrs.require(element_name, "Name")?,
					is_action,
					http_method: attrs.owned("HttpMethod"),
					return_type: attrs.owned("ReturnType"),
					target: attrs.owned(if is_action { "Action" } else { "Function" }),
					parameters: Vec::new(),
				});
			},
			b"Function" | b"Action" if self.container.is_none() => {
				let attrs = Attributes::parse(element)?;
				let name = attrs.require("Function", "Name")?;
				self.operation_def = Some((
					self.qualified(&name),
					OperationDef {
						is_bound: attrs.is_true("IsBound"),
						..Default::default()
					},
				));
			},
			b"ReturnType" => {
				if let Some((_, def)) = self.operation_def.as_mut() {
					let attrs = Attributes::parse(element)?;
					def.return_type = attrs.owned("Type");
				}
			},
			b"Parameter" => {
				let attrs = Attributes::parse(element)?;
				let mut parameter = ParameterDescriptor::new(
					attrs.require("Parameter", "Name")?,
					ParameterLocation::Query,
					attrs.is_false("Nullable"),
				);
				if let Some(edm_type) = attrs.owned("Type") {
					parameter = parameter.with_type(edm_type);
				}
				if let Some(import) = self.import.as_mut() {
					import.parameters.push(parameter);
				} else if let Some((_, def)) = self.operation_def.as_mut() {
					def.parameters.push(parameter);
				}
			},
			_ => {},
		}
		Ok(())
	}

	fn close(&mut self, local_name: &[u8]) {
		match local_name {
			b"Schema" => self.namespace = None,
			b"EntityType" => {
				if let Some(def) = self.entity_type.take() {
					let qualified = self.qualified(&def.name);
					self.model.entity_types.insert(qualified, def);
				}
			},
			b"ComplexType" => self.complex_depth = self.complex_depth.saturating_sub(1),
			b"Association" => {
				if let Some(def) = self.association.take() {
					self.model.associations.push(def);
				}
			},
			b"EntityContainer" => {
				if let Some(container) = self.container.take() {
					self.model.containers.push(container);
				}
			},
			b"FunctionImport" | b"ActionImport" => {
				if let (Some(import), Some(container)) = (self.import.take(), self.container.as_mut()) {
					container.imports.push(import);
				}
			},
			b"Function" | b"Action" => {
				if let Some((qualified, def)) = self.operation_def.take() {
					self.model.operation_defs.insert(qualified, def);
				}
			},
			_ => {},
		}
	}
}

fn parse(xml: &str) -> Result<EdmxModel, CompileError> {
	let mut reader = Reader::from_str(xml);
	reader.config_mut().trim_text(true);

	let mut parser = EdmxParser::default();
	loop {
		match reader.read_event() {
			Ok(Event::Start(element)) => parser.open(&element)?,
			Ok(Event::Empty(element)) => {
				parser.open(&element)?;
				parser.close(element.local_name().as_ref());
			},
			Ok(Event::End(element)) => parser.close(element.local_name().as_ref()),
			Ok(Event::Eof) => break,
			Ok(_) => {},
			Err(e) => {
				return Err(CompileError::Xml(format!(
					"at position {}: {}",
					reader.buffer_position(),
					e
				)));
			},
		}
	}

	Ok(parser.model)
}
