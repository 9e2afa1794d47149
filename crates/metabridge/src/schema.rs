// Canonical schema
//
// Protocol-agnostic reflection model produced by the compilers. A schema is
// assembled once through `SchemaBuilder` and exposes read-only accessors only;
// descriptors are reachable by shared reference and never mutated afterwards.

use std::collections::HashMap;
use std::fmt;

use http::Method;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::catalog::ServiceKind;
use crate::error::CompileError;
use crate::report::serialize_display;

/// Annotation map (`@odata.singleton`, `@openapi.path`, ...), insertion-ordered
pub type Annotations = IndexMap<String, Value>;

pub const ODATA_SINGLETON: &str = "@odata.singleton";
pub const ODATA_ENTITY_SET: &str = "@odata.entitySet";
pub const ODATA_ENTITY_TYPE: &str = "@odata.entityType";
pub const ODATA_HTTP_METHOD: &str = "@odata.httpMethod";
pub const ODATA_RETURN_TYPE: &str = "@odata.returnType";
pub const OPENAPI_PATH: &str = "@openapi.path";
pub const OPENAPI_METHOD: &str = "@openapi.method";
pub const OPENAPI_OPERATION_ID: &str = "@openapi.operationId";
pub const OPENAPI_SUMMARY: &str = "@openapi.summary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
	Entity,
	Singleton,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
	Function,
	Action,
}

/// Kinds of definitions a schema can be reflected over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
	/// Every entity, singletons included
	Entity,
	Singleton,
	Function,
	Action,
	Association,
}

impl fmt::Display for DefinitionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			DefinitionKind::Entity => "entity",
			DefinitionKind::Singleton => "singleton",
			DefinitionKind::Function => "function",
			DefinitionKind::Action => "action",
			DefinitionKind::Association => "association",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
	pub name: String,
	pub edm_type: String,
	pub nullable: bool,
}

impl PropertyDescriptor {
	pub fn new(name: impl Into<String>, edm_type: impl Into<String>, nullable: bool) -> Self {
		Self {
			name: name.into(),
			edm_type: edm_type.into(),
			nullable,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationDescriptor {
	pub name: String,
	/// Qualified name of the target entity type
	pub target: String,
	pub to_many: bool,
	/// Qualified association name, when the source declares one
	#[serde(skip_serializing_if = "Option::is_none")]
	pub association: Option<String>,
}

/// A queryable entity (entity set or singleton)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDescriptor {
	qualified_name: String,
	kind: EntityKind,
	/// Name used to address the entity on the wire
	entity_set: String,
	entity_type: String,
	keys: Vec<String>,
	properties: Vec<PropertyDescriptor>,
	navigation: Vec<NavigationDescriptor>,
	annotations: Annotations,
}

impl EntityDescriptor {
	pub fn new(qualified_name: impl Into<String>, entity_set: impl Into<String>) -> Self {
		Self {
			qualified_name: qualified_name.into(),
			kind: EntityKind::Entity,
			entity_set: entity_set.into(),
			entity_type: String::new(),
			keys: Vec::new(),
			properties: Vec::new(),
			navigation: Vec::new(),
			annotations: Annotations::new(),
		}
	}

	/// Mark as singleton; sets the `@odata.singleton` annotation
	pub fn singleton(mut self) -> Self {
		self.kind = EntityKind::Singleton;
		self.annotations.insert(ODATA_SINGLETON.to_string(), Value::Bool(true));
		self
	}

	pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
		self.entity_type = entity_type.into();
		self
	}

	pub fn with_keys(mut self, keys: Vec<String>) -> Self {
		self.keys = keys;
		self
	}

	pub fn with_properties(mut self, properties: Vec<PropertyDescriptor>) -> Self {
		self.properties = properties;
		self
	}

	pub fn with_navigation(mut self, navigation: Vec<NavigationDescriptor>) -> Self {
		self.navigation = navigation;
		self
	}

	pub fn with_annotation(mut self, key: impl Into<String>, value: Value) -> Self {
		self.annotations.insert(key.into(), value);
		self
	}

	pub fn qualified_name(&self) -> &str {
		&self.qualified_name
	}

	/// Unqualified name (last dotted segment)
	pub fn name(&self) -> &str {
		local_name(&self.qualified_name)
	}

	pub fn kind(&self) -> EntityKind {
		self.kind
	}

	pub fn is_singleton(&self) -> bool {
		self.kind == EntityKind::Singleton
	}

	pub fn entity_set(&self) -> &str {
		&self.entity_set
	}

	pub fn entity_type(&self) -> &str {
		&self.entity_type
	}

	pub fn keys(&self) -> &[String] {
		&self.keys
	}

	pub fn properties(&self) -> &[PropertyDescriptor] {
		&self.properties
	}

	pub fn navigation(&self) -> &[NavigationDescriptor] {
		&self.navigation
	}

	pub fn annotations(&self) -> &Annotations {
		&self.annotations
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
	Query,
	Path,
	Header,
	Cookie,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDescriptor {
	pub name: String,
	pub location: ParameterLocation,
	pub required: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub edm_type: Option<String>,
}

impl ParameterDescriptor {
	pub fn new(name: impl Into<String>, location: ParameterLocation, required: bool) -> Self {
		Self {
			name: name.into(),
			location,
			required,
			edm_type: None,
		}
	}

	pub fn with_type(mut self, edm_type: impl Into<String>) -> Self {
		self.edm_type = Some(edm_type.into());
		self
	}
}

/// A callable function or action
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
	qualified_name: String,
	kind: OperationKind,
	/// Path relative to the service root
	http_path: String,
	#[serde(serialize_with = "serialize_display")]
	http_method: Method,
	parameters: Vec<ParameterDescriptor>,
	annotations: Annotations,
}

impl OperationDescriptor {
	pub fn new(
		qualified_name: impl Into<String>,
		kind: OperationKind,
		http_path: impl Into<String>,
		http_method: Method,
	) -> Self {
		Self {
			qualified_name: qualified_name.into(),
			kind,
			http_path: http_path.into(),
			http_method,
			parameters: Vec::new(),
			annotations: Annotations::new(),
		}
	}

	pub fn with_parameters(mut self, parameters: Vec<ParameterDescriptor>) -> Self {
		self.parameters = parameters;
		self
	}

	pub fn with_annotation(mut self, key: impl Into<String>, value: Value) -> Self {
		self.annotations.insert(key.into(), value);
		self
	}

	pub fn qualified_name(&self) -> &str {
		&self.qualified_name
	}

	pub fn name(&self) -> &str {
		local_name(&self.qualified_name)
	}

	pub fn kind(&self) -> OperationKind {
		self.kind
	}

	pub fn http_path(&self) -> &str {
		&self.http_path
	}

	pub fn http_method(&self) -> &Method {
		&self.http_method
	}

	pub fn parameters(&self) -> &[ParameterDescriptor] {
		&self.parameters
	}

	pub fn annotations(&self) -> &Annotations {
		&self.annotations
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationEnd {
	pub role: String,
	pub entity_type: String,
	pub multiplicity: String,
}

impl AssociationEnd {
	pub fn new(role: impl Into<String>, entity_type: impl Into<String>, multiplicity: impl Into<String>) -> Self {
		Self {
			role: role.into(),
			entity_type: entity_type.into(),
			multiplicity: multiplicity.into(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationDescriptor {
	qualified_name: String,
	ends: Vec<AssociationEnd>,
}

impl AssociationDescriptor {
	pub fn new(qualified_name: impl Into<String>, ends: Vec<AssociationEnd>) -> Self {
		Self {
			qualified_name: qualified_name.into(),
			ends,
		}
	}

	pub fn qualified_name(&self) -> &str {
		&self.qualified_name
	}

	pub fn ends(&self) -> &[AssociationEnd] {
		&self.ends
	}
}

/// Borrowed view of any definition in a schema
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Definition<'a> {
	Entity(&'a EntityDescriptor),
	Operation(&'a OperationDescriptor),
	Association(&'a AssociationDescriptor),
}

impl<'a> Definition<'a> {
	pub fn qualified_name(&self) -> &'a str {
		match self {
			Definition::Entity(e) => e.qualified_name(),
			Definition::Operation(o) => o.qualified_name(),
			Definition::Association(a) => a.qualified_name(),
		}
	}

	/// Most specific kind of this definition
	pub fn kind(&self) -> DefinitionKind {
		match self {
			Definition::Entity(e) if e.is_singleton() => DefinitionKind::Singleton,
			Definition::Entity(_) => DefinitionKind::Entity,
			Definition::Operation(o) => match o.kind() {
				OperationKind::Function => DefinitionKind::Function,
				OperationKind::Action => DefinitionKind::Action,
			},
			Definition::Association(_) => DefinitionKind::Association,
		}
	}

	/// Whether this definition is reflected by `each(kind)`
	pub fn is_a(&self, kind: DefinitionKind) -> bool {
		match (self, kind) {
			(Definition::Entity(_), DefinitionKind::Entity) => true,
			_ => self.kind() == kind,
		}
	}

	pub fn as_entity(&self) -> Option<&'a EntityDescriptor> {
		match self {
			Definition::Entity(e) => Some(e),
			_ => None,
		}
	}

	pub fn as_operation(&self) -> Option<&'a OperationDescriptor> {
		match self {
			Definition::Operation(o) => Some(o),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
	Entity(usize),
	Operation(usize),
	Association(usize),
}

/// Compiled, immutable schema for one service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalSchema {
	service: String,
	protocol: ServiceKind,
	entities: Vec<EntityDescriptor>,
	operations: Vec<OperationDescriptor>,
	associations: Vec<AssociationDescriptor>,
	#[serde(skip)]
	index: HashMap<String, Slot>,
}

impl CanonicalSchema {
	pub fn builder(service: impl Into<String>, protocol: ServiceKind) -> SchemaBuilder {
		SchemaBuilder {
			service: service.into(),
			protocol,
			entities: Vec::new(),
			operations: Vec::new(),
			associations: Vec::new(),
		}
	}

	/// Service namespace every qualified name is prefixed with
	pub fn service(&self) -> &str {
		&self.service
	}

	/// Protocol of the document this schema was compiled from
	pub fn protocol(&self) -> ServiceKind {
		self.protocol
	}

	pub fn entities(&self) -> &[EntityDescriptor] {
		&self.entities
	}

	pub fn operations(&self) -> &[OperationDescriptor] {
		&self.operations
	}

	pub fn associations(&self) -> &[AssociationDescriptor] {
		&self.associations
	}

	/// All definitions: entities, then operations, then associations
	pub fn definitions(&self) -> impl Iterator<Item = Definition<'_>> + '_ {
		self.entities
			.iter()
			.map(Definition::Entity)
			.chain(self.operations.iter().map(Definition::Operation))
			.chain(self.associations.iter().map(Definition::Association))
	}

	/// Definitions of one kind. Each call starts a fresh pass.
	pub fn each(&self, kind: DefinitionKind) -> impl Iterator<Item = Definition<'_>> + '_ {
		self.definitions().filter(move |d| d.is_a(kind))
	}

	pub fn find(&self, qualified_name: &str) -> Option<Definition<'_>> {
		let slot = self.index.get(qualified_name)?;
		Some(match *slot {
			Slot::Entity(i) => Definition::Entity(&self.entities[i]),
			Slot::Operation(i) => Definition::Operation(&self.operations[i]),
			Slot::Association(i) => Definition::Association(&self.associations[i]),
		})
	}

	/// Find an entity by qualified name, or by its name within this service
	pub fn entity(&self, name: &str) -> Option<&EntityDescriptor> {
		self.find(name)
			.or_else(|| self.find(&format!("{}.{}", self.service, name)))
			.and_then(|d| d.as_entity())
	}

	pub fn len(&self) -> usize {
		self.index.len()
	}

	pub fn is_empty(&self) -> bool {
		self.index.is_empty()
	}
}

/// Accumulates definitions and produces a `CanonicalSchema`
#[derive(Debug)]
pub struct SchemaBuilder {
	service: String,
	protocol: ServiceKind,
	entities: Vec<EntityDescriptor>,
	operations: Vec<OperationDescriptor>,
	associations: Vec<AssociationDescriptor>,
}

impl SchemaBuilder {
	pub fn entity(mut self, entity: EntityDescriptor) -> Self {
		self.entities.push(entity);
		self
	}

	pub fn operation(mut self, operation: OperationDescriptor) -> Self {
		self.operations.push(operation);
		self
	}

	pub fn association(mut self, association: AssociationDescriptor) -> Self {
		self.associations.push(association);
		self
	}

	pub fn build(self) -> Result<CanonicalSchema, CompileError> {
		let mut index = HashMap::new();
		let names = self
			.entities
			.iter()
			.enumerate()
			.map(|(i, e)| (e.qualified_name.as_str(), Slot::Entity(i)))
			.chain(
				self.operations
					.iter()
					.enumerate()
					.map(|(i, o)| (o.qualified_name.as_str(), Slot::Operation(i))),
			)
			.chain(
				self.associations
					.iter()
					.enumerate()
					.map(|(i, a)| (a.qualified_name.as_str(), Slot::Association(i))),
			);

		for (name, slot) in names {
			if index.insert(name.to_string(), slot).is_some() {
				return Err(CompileError::DuplicateDefinition(name.to_string()));
			}
		}

		Ok(CanonicalSchema {
			service: self.service,
			protocol: self.protocol,
			entities: self.entities,
			operations: self.operations,
			associations: self.associations,
			index,
		})
	}
}

fn local_name(qualified_name: &str) -> &str {
	qualified_name
		.rsplit_once('.')
		.map(|(_, name)| name)
		.unwrap_or(qualified_name)
}
