use crate::spec::ParameterStyle;
use serde_json::Value;

fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn enc(v: &Value) -> String {
    urlencoding::encode(&scalar_text(v)).into_owned()
}

/// Serialize a query parameter value into `(key, raw value)` pairs.
///
/// Values come back percent-encoded and ready to join with `=`; keys are
/// plain and are encoded by [`super::QueryPairs::encode`]. This is the
/// inverse of query decoding for the form, spaceDelimited, pipeDelimited and
/// deepObject styles.
pub fn encode_query_param(
    name: &str,
    style: ParameterStyle,
    explode: bool,
    value: &Value,
) -> Vec<(String, String)> {
    if style == ParameterStyle::DeepObject {
        let mut out = Vec::new();
        deep_pairs(name, value, &mut out);
        return out;
    }
    let sep = match style {
        ParameterStyle::SpaceDelimited => "%20",
        ParameterStyle::PipeDelimited => "|",
        _ => ",",
    };
    match value {
        Value::Array(items) if explode => items
            .iter()
            .map(|i| (name.to_string(), enc(i)))
            .collect(),
        Value::Array(items) => {
            let joined = items.iter().map(enc).collect::<Vec<_>>().join(sep);
            vec![(name.to_string(), joined)]
        }
        Value::Object(map) if explode => map
            .iter()
            .map(|(k, v)| (k.clone(), enc(v)))
            .collect(),
        Value::Object(map) => {
            let joined = map
                .iter()
                .flat_map(|(k, v)| [urlencoding::encode(k).into_owned(), enc(v)])
                .collect::<Vec<_>>()
                .join(sep);
            vec![(name.to_string(), joined)]
        }
        scalar => vec![(name.to_string(), enc(scalar))],
    }
}

fn deep_pairs(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                deep_pairs(&format!("{prefix}[{k}]"), v, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                out.push((prefix.to_string(), enc(item)));
            }
        }
        scalar => out.push((prefix.to_string(), enc(scalar))),
    }
}
