use super::{BodyContext, BodyDecoder, BodyError, DecodedBody};
use crate::decode::{base_key, decode_deep_object, decode_value, form_decode, QueryPairs, QuerySource};
use crate::spec::{MediaTypeMeta, ParameterStyle, SchemaArena, SchemaId, SchemaType};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// `application/x-www-form-urlencoded`.
///
/// Each declared property is decoded with the query rules and the style the
/// media type's `encoding` gives it (form, exploded, by default). Fields the
/// schema does not declare are kept as strings so `additionalProperties`
/// still applies to them.
#[derive(Debug, Default)]
pub struct FormDecoder;

fn property_encoding(media: Option<&MediaTypeMeta>, prop: &str) -> (ParameterStyle, bool) {
    let enc = media.and_then(|m| m.encoding.get(prop));
    let style = enc.and_then(|e| e.style).unwrap_or(ParameterStyle::Form);
    let explode = enc
        .and_then(|e| e.explode)
        .unwrap_or(style == ParameterStyle::Form);
    (style, explode)
}

/// Object schema of `prop` when it is sent exploded, its own properties
/// then appearing as top-level form keys.
fn exploded_object(
    arena: &SchemaArena,
    media: Option<&MediaTypeMeta>,
    prop_schema: Option<SchemaId>,
    prop: &str,
) -> Option<SchemaId> {
    match property_encoding(media, prop) {
        (ParameterStyle::DeepObject, _) | (_, false) => None,
        _ => prop_schema.filter(|p| arena.get(*p).has_type(SchemaType::Object)),
    }
}

/// Top-level form keys that belong to an exploded object property.
pub fn exploded_fields<'a>(arena: &'a SchemaArena, media: &MediaTypeMeta) -> Vec<&'a str> {
    let Some(id) = media.schema else {
        return Vec::new();
    };
    let node = arena.get(id);
    let (declared, _) = arena.declared_properties(id);
    declared
        .into_iter()
        .filter_map(|prop| {
            let prop_schema = crate::decode::property_schema(arena, node, prop);
            exploded_object(arena, Some(media), prop_schema, prop)
        })
        .flat_map(|p| arena.declared_properties(p).0)
        .collect()
}

impl BodyDecoder for FormDecoder {
    fn decode(&self, body: &[u8], ctx: &BodyContext<'_>) -> Result<DecodedBody, BodyError> {
        let text = std::str::from_utf8(body)
            .map_err(|e| BodyError::malformed("application/x-www-form-urlencoded", e))?;
        let pairs = QueryPairs::parse(text);
        let fields: Vec<String> = {
            let mut seen = HashSet::new();
            pairs
                .keys()
                .map(base_key)
                .filter(|k| seen.insert(*k))
                .map(str::to_string)
                .collect()
        };

        let schema = ctx.media.and_then(|m| m.schema);
        let mut out = Map::new();
        let mut claimed: HashSet<String> = HashSet::new();

        if let Some(id) = schema {
            let arena = ctx.arena;
            let (declared, _) = arena.declared_properties(id);
            let node = arena.get(id);
            for prop in declared {
                let prop_schema = crate::decode::property_schema(arena, node, prop);
                let (style, explode) = property_encoding(ctx.media, prop);

                claimed.insert(prop.to_string());
                let decoded = if style == ParameterStyle::DeepObject {
                    decode_deep_object(prop, &pairs, arena, prop_schema)
                } else {
                    if let Some(p) = exploded_object(arena, ctx.media, prop_schema, prop) {
                        let (inner, _) = arena.declared_properties(p);
                        claimed.extend(inner.iter().map(|s| s.to_string()));
                    }
                    let source = QuerySource {
                        name: prop,
                        style,
                        explode,
                        pairs: &pairs,
                    };
                    decode_value(&source, arena, prop_schema)
                };
                match decoded {
                    Ok(Some(v)) => {
                        out.insert(prop.to_string(), v);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        return Err(BodyError::malformed(
                            "application/x-www-form-urlencoded",
                            e.within(prop),
                        ))
                    }
                }
            }
        }

        for (key, raw) in pairs.iter() {
            let base = base_key(key);
            if claimed.contains(base) || out.contains_key(base) {
                continue;
            }
            out.insert(key.to_string(), Value::String(form_decode(raw).into_owned()));
        }

        Ok(DecodedBody {
            value: Value::Object(out),
            fields,
        })
    }
}
