//! Schema arena.
//!
//! Every schema reachable from an operation is stored once in a flat arena and
//! addressed by [`SchemaId`]. `$ref`s are resolved to indices while the arena is
//! built, so recursive component graphs (`Node -> children -> Node`) never form
//! ownership cycles and the whole arena is released with the document.

use super::types::SchemaDialect;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Index of a schema inside a [`SchemaArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(u32);

impl SchemaId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// JSON Schema primitive type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaType {
    Null,
    Boolean,
    Object,
    Array,
    Number,
    Integer,
    String,
}

impl SchemaType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "null" => Some(SchemaType::Null),
            "boolean" => Some(SchemaType::Boolean),
            "object" => Some(SchemaType::Object),
            "array" => Some(SchemaType::Array),
            "number" => Some(SchemaType::Number),
            "integer" => Some(SchemaType::Integer),
            "string" => Some(SchemaType::String),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Null => "null",
            SchemaType::Boolean => "boolean",
            SchemaType::Object => "object",
            SchemaType::Array => "array",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::String => "string",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdditionalProperties {
    /// Keyword absent: JSON Schema allows anything, detection treats extras as unknown.
    #[default]
    Unspecified,
    Allowed,
    Denied,
    Schema(SchemaId),
}

#[derive(Debug, Clone, Default)]
pub struct SchemaNode {
    /// Declared types, `null` excluded (see `nullable`).
    pub types: Vec<SchemaType>,
    pub nullable: bool,
    pub format: Option<String>,
    pub items: Option<SchemaId>,
    pub properties: Vec<(String, SchemaId)>,
    pub required: Vec<String>,
    pub additional_properties: AdditionalProperties,
    pub all_of: Vec<SchemaId>,
    pub any_of: Vec<SchemaId>,
    pub one_of: Vec<SchemaId>,
    pub default: Option<Value>,
    /// Component name when this node was reached through `$ref`.
    pub ref_name: Option<String>,
    /// Schema in the form handed to the JSON Schema compiler.
    pub json: Value,
}

impl SchemaNode {
    pub fn has_type(&self, t: SchemaType) -> bool {
        self.types.contains(&t)
    }

    /// Type used when a value has to be parsed from text.
    ///
    /// Without a declared type the raw text is kept as a string.
    pub fn primary_type(&self) -> Option<SchemaType> {
        self.types.first().copied()
    }

    pub fn is_composed(&self) -> bool {
        !(self.all_of.is_empty() && self.any_of.is_empty() && self.one_of.is_empty())
    }

    pub fn property(&self, name: &str) -> Option<SchemaId> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }
}

#[derive(Debug, Default)]
pub struct SchemaArena {
    nodes: Vec<SchemaNode>,
    /// `components` subtree, converted, for `$ref` resolution at compile time.
    components: Value,
}

impl SchemaArena {
    pub fn get(&self, id: SchemaId) -> &SchemaNode {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn components(&self) -> &Value {
        &self.components
    }

    /// Compile root for `id`: the schema plus the components it may reference.
    pub fn compile_root(&self, id: SchemaId) -> Value {
        let mut root = Map::new();
        root.insert(
            "allOf".to_string(),
            Value::Array(vec![self.get(id).json.clone()]),
        );
        if !self.components.is_null() {
            root.insert("components".to_string(), self.components.clone());
        }
        Value::Object(root)
    }

    /// Property names an object schema declares, following composition keywords.
    ///
    /// The second element is true when the schema (or a branch) accepts
    /// additional properties explicitly.
    pub fn declared_properties(&self, id: SchemaId) -> (Vec<&str>, bool) {
        let mut names = Vec::new();
        let mut open = false;
        let mut seen = Vec::new();
        self.collect_properties(id, &mut names, &mut open, &mut seen);
        (names, open)
    }

    fn collect_properties<'a>(
        &'a self,
        id: SchemaId,
        names: &mut Vec<&'a str>,
        open: &mut bool,
        seen: &mut Vec<SchemaId>,
    ) {
        if seen.contains(&id) {
            return;
        }
        seen.push(id);
        let node = self.get(id);
        for (name, _) in &node.properties {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        if matches!(
            node.additional_properties,
            AdditionalProperties::Allowed | AdditionalProperties::Schema(_)
        ) {
            *open = true;
        }
        for branch in node.all_of.iter().chain(&node.any_of).chain(&node.one_of) {
            self.collect_properties(*branch, names, open, seen);
        }
    }

    /// First declared type, looking through composition branches.
    pub fn expected_type(&self, id: SchemaId) -> Option<SchemaType> {
        let node = self.get(id);
        if let Some(t) = node.primary_type() {
            return Some(t);
        }
        node.all_of
            .iter()
            .chain(&node.one_of)
            .chain(&node.any_of)
            .find_map(|b| self.get(*b).primary_type())
    }
}

/// Builds a [`SchemaArena`] from schema objects found in a raw document.
pub(crate) struct ArenaBuilder<'doc> {
    doc: &'doc Value,
    dialect: SchemaDialect,
    nodes: Vec<SchemaNode>,
    refs: HashMap<String, SchemaId>,
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaRefError {
    #[error("unresolvable reference {0}")]
    Unresolved(String),
    #[error("external reference {0} is not supported")]
    External(String),
}

impl<'doc> ArenaBuilder<'doc> {
    pub(crate) fn new(doc: &'doc Value, dialect: SchemaDialect) -> Self {
        Self {
            doc,
            dialect,
            nodes: Vec::new(),
            refs: HashMap::new(),
        }
    }

    /// Resolve a `$ref` on any object (parameter, request body, ...).
    pub(crate) fn deref<'v>(&self, value: &'v Value) -> Result<&'v Value, SchemaRefError>
    where
        'doc: 'v,
    {
        let mut current = value;
        for _ in 0..32 {
            match current.get("$ref").and_then(Value::as_str) {
                Some(r) => current = self.pointer(r)?,
                None => return Ok(current),
            }
        }
        Err(SchemaRefError::Unresolved("reference chain too deep".to_string()))
    }

    fn pointer(&self, reference: &str) -> Result<&'doc Value, SchemaRefError> {
        let Some(fragment) = reference.strip_prefix('#') else {
            return Err(SchemaRefError::External(reference.to_string()));
        };
        self.doc
            .pointer(fragment)
            .ok_or_else(|| SchemaRefError::Unresolved(reference.to_string()))
    }

    pub(crate) fn add(&mut self, value: &Value) -> Result<SchemaId, SchemaRefError> {
        if let Some(reference) = value.get("$ref").and_then(Value::as_str) {
            if let Some(id) = self.refs.get(reference) {
                return Ok(*id);
            }
            let target = self.pointer(reference)?;
            let id = self.reserve();
            self.refs.insert(reference.to_string(), id);
            let mut node = self.build(target)?;
            node.ref_name = reference.rsplit('/').next().map(str::to_string);
            if reference.starts_with("#/components/schemas/") {
                node.json = serde_json::json!({ "$ref": reference });
            }
            self.nodes[id.index()] = node;
            return Ok(id);
        }
        let node = self.build(value)?;
        let id = self.reserve();
        self.nodes[id.index()] = node;
        Ok(id)
    }

    fn reserve(&mut self) -> SchemaId {
        self.nodes.push(SchemaNode::default());
        SchemaId((self.nodes.len() - 1) as u32)
    }

    fn build(&mut self, value: &Value) -> Result<SchemaNode, SchemaRefError> {
        let mut node = SchemaNode {
            json: convert_schema(value, self.dialect),
            ..SchemaNode::default()
        };
        let Some(obj) = value.as_object() else {
            // Boolean schemas (3.1) carry no structure.
            return Ok(node);
        };

        match obj.get("type") {
            Some(Value::String(t)) => node.types.extend(SchemaType::parse(t)),
            Some(Value::Array(ts)) => node
                .types
                .extend(ts.iter().filter_map(Value::as_str).filter_map(SchemaType::parse)),
            _ => {}
        }
        node.nullable = obj.get("nullable").and_then(Value::as_bool).unwrap_or(false)
            || node.types.contains(&SchemaType::Null);
        node.types.retain(|t| *t != SchemaType::Null);
        node.format = obj.get("format").and_then(Value::as_str).map(str::to_string);
        node.default = obj.get("default").cloned();

        if let Some(items) = obj.get("items").filter(|v| v.is_object()) {
            node.items = Some(self.add(items)?);
        }
        if let Some(props) = obj.get("properties").and_then(Value::as_object) {
            for (name, schema) in props {
                let id = self.add(schema)?;
                node.properties.push((name.clone(), id));
            }
        }
        if let Some(req) = obj.get("required").and_then(Value::as_array) {
            node.required = req.iter().filter_map(Value::as_str).map(str::to_string).collect();
        }
        node.additional_properties = match obj.get("additionalProperties") {
            Some(Value::Bool(true)) => AdditionalProperties::Allowed,
            Some(Value::Bool(false)) => AdditionalProperties::Denied,
            Some(v @ Value::Object(_)) => AdditionalProperties::Schema(self.add(v)?),
            _ => AdditionalProperties::Unspecified,
        };
        node.all_of = self.add_list(obj.get("allOf"))?;
        node.any_of = self.add_list(obj.get("anyOf"))?;
        node.one_of = self.add_list(obj.get("oneOf"))?;
        Ok(node)
    }

    fn add_list(&mut self, value: Option<&Value>) -> Result<Vec<SchemaId>, SchemaRefError> {
        let Some(list) = value.and_then(Value::as_array) else {
            return Ok(Vec::new());
        };
        list.iter().map(|v| self.add(v)).collect()
    }

    pub(crate) fn finish(self) -> SchemaArena {
        let components = match self.doc.get("components") {
            Some(c) => convert_components(c, self.dialect),
            None => Value::Null,
        };
        SchemaArena {
            nodes: self.nodes,
            components,
        }
    }
}

/// Keywords that describe a schema but never constrain a value.
const ANNOTATION_ONLY: &[&str] = &["example", "discriminator", "xml", "externalDocs"];

/// Keywords whose value is a single subschema.
const SUBSCHEMA: &[&str] = &[
    "items",
    "additionalProperties",
    "not",
    "additionalItems",
    "contains",
    "propertyNames",
    "if",
    "then",
    "else",
    "unevaluatedProperties",
    "unevaluatedItems",
];

/// Keywords whose value is a list of subschemas.
const SUBSCHEMA_LIST: &[&str] = &["allOf", "anyOf", "oneOf", "prefixItems"];

/// Keywords whose value maps names to subschemas.
const SUBSCHEMA_MAP: &[&str] = &["properties", "patternProperties", "$defs", "definitions"];

/// Rewrite an OpenAPI schema object into plain JSON Schema for `dialect`.
///
/// OpenAPI 3.0 `nullable` is folded into `type` (and `enum`), annotation-only
/// keywords are dropped, everything else is kept verbatim.
pub fn convert_schema(value: &Value, dialect: SchemaDialect) -> Value {
    let Some(obj) = value.as_object() else {
        return value.clone();
    };
    let mut out = Map::with_capacity(obj.len());
    for (key, v) in obj {
        let k = key.as_str();
        if ANNOTATION_ONLY.contains(&k) || k == "nullable" {
            continue;
        }
        if dialect == SchemaDialect::Oas30 && (k == "examples" || k == "deprecated") {
            continue;
        }
        let converted = if SUBSCHEMA.contains(&k) {
            convert_schema(v, dialect)
        } else if SUBSCHEMA_LIST.contains(&k) {
            match v {
                Value::Array(list) => {
                    Value::Array(list.iter().map(|s| convert_schema(s, dialect)).collect())
                }
                other => other.clone(),
            }
        } else if SUBSCHEMA_MAP.contains(&k) {
            match v {
                Value::Object(map) => Value::Object(
                    map.iter()
                        .map(|(n, s)| (n.clone(), convert_schema(s, dialect)))
                        .collect(),
                ),
                other => other.clone(),
            }
        } else {
            v.clone()
        };
        out.insert(key.clone(), converted);
    }

    let nullable = obj.get("nullable").and_then(Value::as_bool).unwrap_or(false);
    if nullable && dialect == SchemaDialect::Oas30 {
        if let Some(t) = out.get_mut("type") {
            match t {
                Value::String(s) => {
                    *t = Value::Array(vec![Value::String(s.clone()), Value::from("null")]);
                }
                Value::Array(list) if !list.iter().any(|x| x == "null") => {
                    list.push(Value::from("null"));
                }
                _ => {}
            }
        }
        if let Some(Value::Array(list)) = out.get_mut("enum") {
            if !list.contains(&Value::Null) {
                list.push(Value::Null);
            }
        }
    }
    Value::Object(out)
}

fn convert_components(components: &Value, dialect: SchemaDialect) -> Value {
    let Some(obj) = components.as_object() else {
        return Value::Null;
    };
    let mut out = Map::new();
    if let Some(Value::Object(schemas)) = obj.get("schemas") {
        out.insert(
            "schemas".to_string(),
            Value::Object(
                schemas
                    .iter()
                    .map(|(n, s)| (n.clone(), convert_schema(s, dialect)))
                    .collect(),
            ),
        );
    }
    // Parameters and bodies may be referenced from inside schemas in the wild;
    // copying them keeps such pointers resolvable.
    for section in ["parameters", "requestBodies", "headers"] {
        if let Some(v) = obj.get(section) {
            out.insert(section.to_string(), v.clone());
        }
    }
    Value::Object(out)
}

/// Remove every `pattern` keyword. Used when a document ships a regex the
/// JSON Schema engine cannot compile.
pub fn strip_patterns(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if matches!(map.get("pattern"), Some(Value::String(_))) {
                map.remove("pattern");
            }
            for v in map.values_mut() {
                strip_patterns(v);
            }
        }
        Value::Array(list) => list.iter_mut().for_each(strip_patterns),
        _ => {}
    }
}
