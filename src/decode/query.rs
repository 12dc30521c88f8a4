use super::error::ParseError;
use super::value::{parse_primitive, property_schema, StyleSource};
use crate::spec::{ParameterStyle, SchemaArena, SchemaId, SchemaType};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Percent-decode form-encoded text (`+` is a space).
pub fn form_decode(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['%', '+']) {
        return Cow::Borrowed(raw);
    }
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(d) => Cow::Owned(d.into_owned()),
        Err(_) => Cow::Owned(spaced),
    }
}

/// Split raw text on any of `delims`, decoding each piece afterwards.
pub fn split_decode(raw: &str, delims: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = raw;
    loop {
        let next = delims
            .iter()
            .filter_map(|d| rest.find(d).map(|i| (i, d.len())))
            .min_by_key(|(i, _)| *i);
        match next {
            Some((i, len)) => {
                out.push(form_decode(&rest[..i]).into_owned());
                rest = &rest[i + len..];
            }
            None => {
                out.push(form_decode(rest).into_owned());
                return out;
            }
        }
    }
}

/// Query string as ordered `(decoded key, raw value)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPairs {
    pairs: Vec<(String, String)>,
}

impl QueryPairs {
    pub fn parse(query: &str) -> Self {
        let pairs = query
            .split('&')
            .filter(|p| !p.is_empty())
            .map(|p| match p.split_once('=') {
                Some((k, v)) => (form_decode(k).into_owned(), v.to_string()),
                None => (form_decode(p).into_owned(), String::new()),
            })
            .collect();
        Self { pairs }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(k, _)| k.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn push(&mut self, key: impl Into<String>, raw_value: impl Into<String>) {
        self.pairs.push((key.into(), raw_value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Re-encode into a query string.
    pub fn encode(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| {
                let key = urlencoding::encode(k);
                if v.is_empty() {
                    key.into_owned()
                } else {
                    format!("{key}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Query (and form body) serialization of one parameter.
pub struct QuerySource<'a> {
    pub name: &'a str,
    pub style: ParameterStyle,
    pub explode: bool,
    pub pairs: &'a QueryPairs,
}

impl QuerySource<'_> {
    fn delimiters(&self) -> &'static [&'static str] {
        match self.style {
            ParameterStyle::SpaceDelimited => &[" ", "%20", "+"],
            ParameterStyle::PipeDelimited => &["|", "%7C", "%7c"],
            // An escaped comma stays inside its value.
            _ => &[","],
        }
    }
}

impl StyleSource for QuerySource<'_> {
    fn primitive(&self) -> Result<Option<String>, ParseError> {
        Ok(self.pairs.first(self.name).map(|v| form_decode(v).into_owned()))
    }

    fn array(&self) -> Result<Option<Vec<String>>, ParseError> {
        if !self.pairs.contains(self.name) {
            return Ok(None);
        }
        if self.explode {
            return Ok(Some(
                self.pairs
                    .all(self.name)
                    .map(|v| form_decode(v).into_owned())
                    .collect(),
            ));
        }
        let raw = self.pairs.first(self.name).unwrap_or_default();
        if raw.is_empty() {
            return Ok(Some(Vec::new()));
        }
        Ok(Some(split_decode(raw, self.delimiters())))
    }

    fn object(&self, declared: &[&str]) -> Result<Option<Vec<(String, String)>>, ParseError> {
        if self.explode {
            let found: Vec<(String, String)> = declared
                .iter()
                .filter_map(|prop| {
                    self.pairs
                        .first(prop)
                        .map(|v| (prop.to_string(), form_decode(v).into_owned()))
                })
                .collect();
            return Ok(if found.is_empty() { None } else { Some(found) });
        }
        let Some(raw) = self.pairs.first(self.name) else {
            return Ok(None);
        };
        pairs_from_list(raw, split_decode(raw, self.delimiters())).map(Some)
    }
}

/// Pair up a flat `k1,v1,k2,v2` list.
pub(crate) fn pairs_from_list(
    raw: &str,
    items: Vec<String>,
) -> Result<Vec<(String, String)>, ParseError> {
    if items.len() % 2 != 0 {
        return Err(ParseError::invalid(raw, "a value must be a list of object's properties in format \"name,value\""));
    }
    let mut out = Vec::with_capacity(items.len() / 2);
    let mut it = items.into_iter();
    while let (Some(k), Some(v)) = (it.next(), it.next()) {
        out.push((k, v));
    }
    Ok(out)
}

/// Nested bracket keys collected for a deepObject parameter.
#[derive(Debug, Default)]
struct DeepTree {
    leaves: Vec<String>,
    children: Vec<(String, DeepTree)>,
}

impl DeepTree {
    fn child(&mut self, key: &str) -> &mut DeepTree {
        let pos = match self.children.iter().position(|(k, _)| k == key) {
            Some(p) => p,
            None => {
                self.children.push((key.to_string(), DeepTree::default()));
                self.children.len() - 1
            }
        };
        &mut self.children[pos].1
    }
}

/// Split `name[a][b]` into `["a", "b"]` when the key belongs to `name`.
fn bracket_path<'k>(name: &str, key: &'k str) -> Option<Vec<&'k str>> {
    let rest = key.strip_prefix(name)?;
    if !rest.starts_with('[') {
        return None;
    }
    let mut out = Vec::new();
    let mut rest = rest;
    while let Some(stripped) = rest.strip_prefix('[') {
        let end = stripped.find(']')?;
        out.push(&stripped[..end]);
        rest = &stripped[end + 1..];
    }
    if rest.is_empty() {
        Some(out)
    } else {
        None
    }
}

/// Decode a `deepObject` parameter: `name[prop]=v`, nested `name[prop][sub]=v`.
///
/// Property names not declared by the schema are accepted and decoded with
/// the `additionalProperties` schema when one is given.
pub fn decode_deep_object(
    name: &str,
    pairs: &QueryPairs,
    arena: &SchemaArena,
    id: Option<SchemaId>,
) -> Result<Option<Value>, ParseError> {
    let mut root = DeepTree::default();
    let mut any = false;
    for (key, raw) in pairs.iter() {
        let Some(path) = bracket_path(name, key) else {
            continue;
        };
        any = true;
        let mut node = &mut root;
        for seg in path {
            node = node.child(seg);
        }
        node.leaves.push(form_decode(raw).into_owned());
    }
    if !any {
        return Ok(None);
    }
    deep_value(&root, arena, id).map(Some)
}

fn deep_value(tree: &DeepTree, arena: &SchemaArena, id: Option<SchemaId>) -> Result<Value, ParseError> {
    let node = id.map(|i| arena.get(i));
    let is_array = node.is_some_and(|n| n.has_type(SchemaType::Array));

    if is_array {
        let items = node.and_then(|n| n.items);
        let mut out = Vec::new();
        // `name[list]=a&name[list]=b` or `name[list][0]=a&name[list][1]=b`
        for (i, leaf) in tree.leaves.iter().enumerate() {
            out.push(parse_primitive(leaf, arena, items).map_err(|e| e.within(i))?);
        }
        for (k, child) in &tree.children {
            out.push(deep_value(child, arena, items).map_err(|e| e.within(k))?);
        }
        return Ok(Value::Array(out));
    }

    if tree.children.is_empty() {
        let leaf = tree.leaves.first().map(String::as_str).unwrap_or_default();
        return parse_primitive(leaf, arena, id);
    }

    let mut map = Map::new();
    for (k, child) in &tree.children {
        let prop = node.and_then(|n| property_schema(arena, n, k));
        map.insert(k.clone(), deep_value(child, arena, prop).map_err(|e| e.within(k))?);
    }
    Ok(Value::Object(map))
}

/// Declared name a query key refers to: `filter[a][b]` refers to `filter`.
pub fn base_key(key: &str) -> &str {
    match key.find('[') {
        Some(i) if i > 0 => &key[..i],
        _ => key,
    }
}
