//! Converts JSON data into [`gtmpl::Value`]s for templating.

use gtmpl::Value;
use serde_json::{Map, Value as Json};
use std::collections::HashMap;

/// Converts a JSON value. Integers stay integers; other numbers become
/// floats.
pub fn from_json(json: &Json) -> Value {
    match json {
        Json::Null => Value::Nil,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::from(i),
            None => match n.as_u64() {
                Some(u) => Value::from(u),
                None => Value::from(n.as_f64().unwrap_or(f64::NAN)),
            },
        },
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::Array(items.iter().map(from_json).collect()),
        Json::Object(map) => from_map(map),
    }
}

/// Converts a JSON mapping into a [`Value::Object`].
pub fn from_map(map: &Map<String, Json>) -> Value {
    let mut m: HashMap<String, Value> = HashMap::with_capacity(map.len());
    for (key, value) in map {
        m.insert(key.clone(), from_json(value));
    }
    Value::Object(m)
}
