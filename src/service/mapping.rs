//! Field discovery from index mapping documents.
use crate::error::{Error, Result};
use log::warn;
use serde_json::Value;

/// Field types that have no faithful flat scalar rendering.
const DISALLOWED_TYPES: [&str; 6] = [
    "alias",
    "completion",
    "aggregate_metric_double",
    "dense_vector",
    "rank_feature",
    "rank_features",
];

fn is_disallowed(field_type: &str) -> bool {
    DISALLOWED_TYPES.contains(&field_type)
}

/// Collects exportable field names from the `GET /{index}/_mapping`
/// response of `collection`.
///
/// A malformed document stops discovery for this collection only; whatever
/// was collected before the bad entry is still returned.
pub fn discover_fields(document: &Value, collection: &str) -> Vec<String> {
    let mut fields = Vec::new();
    if let Err(e) = collect_mapping(document, collection, &mut fields) {
        warn!("Failed to read the mapping of {collection}: {e}");
    }
    fields
}

fn collect_mapping(document: &Value, collection: &str, out: &mut Vec<String>) -> Result<()> {
    let malformed = |reason: &str| Error::Response {
        url: format!("/{collection}/_mapping"),
        reason: reason.to_owned(),
    };

    // Aliases answer under the concrete index name.
    let entry = document
        .get(collection)
        .or_else(|| document.as_object().and_then(|map| map.values().next()))
        .ok_or_else(|| malformed("no mapping entry for the index"))?;
    let mappings = entry
        .get("mappings")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("missing 'mappings' object"))?;

    if let Some(properties) = mappings.get("properties") {
        return flatten_properties(properties, out);
    }

    // Pre-7.x layouts nest properties under a mapping type.
    for type_mapping in mappings.values() {
        if let Some(properties) = type_mapping.get("properties") {
            flatten_properties(properties, out)?;
        }
    }
    Ok(())
}

/// Flattens one `properties` object into leaf field names.
///
/// Top-level fields are kept unless their type is disallowed. Fields with
/// nested `properties` are descended into, and there only leaves that
/// declare an allowed type are kept. A definition may be the usual
/// `{"type": "keyword"}` object or just the type string.
pub fn flatten_properties(properties: &Value, out: &mut Vec<String>) -> Result<()> {
    flatten_level(properties, 0, out)
}

fn flatten_level(properties: &Value, depth: usize, out: &mut Vec<String>) -> Result<()> {
    let properties = properties.as_object().ok_or_else(|| Error::Response {
        url: String::from("_mapping"),
        reason: format!("'properties' at depth {depth} is not an object"),
    })?;

    for (name, definition) in properties {
        let field_type = match definition {
            Value::String(field_type) => Some(field_type.as_str()),
            Value::Object(definition) => {
                if let Some(nested) = definition.get("properties") {
                    flatten_level(nested, depth + 1, out)?;
                    continue;
                }
                definition.get("type").and_then(Value::as_str)
            }
            _ => {
                return Err(Error::Response {
                    url: String::from("_mapping"),
                    reason: format!("field '{name}' has a malformed definition"),
                })
            }
        };

        let keep = match field_type {
            Some(field_type) => !is_disallowed(field_type),
            None => depth == 0,
        };
        if keep {
            out.push(name.clone());
        }
    }
    Ok(())
}
