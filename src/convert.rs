//! Conversion between tool arguments (JSON) and MongoDB values (BSON).
//!
//! Arguments arrive as JSON and may use Extended JSON (`{"$oid": ...}`,
//! `{"$date": ...}`) for BSON-only types. Results go back as relaxed
//! Extended JSON.

use mongodb::bson::{extjson, Bson, Document};
use mongodb::options::Hint;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Collections under this prefix are server internals and never exposed.
pub const SYSTEM_COLLECTION_PREFIX: &str = "system.";

/// A tool argument that cannot be forwarded to the driver.
#[derive(Error, Debug)]
pub enum ArgError {
    #[error("collection name must not be empty")]
    EmptyCollection,
    #[error("Access to system collections is not allowed")]
    SystemCollection,
    #[error("Missing {field} argument")]
    Missing { field: &'static str },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} must be a positive integer")]
    NotPositive { field: &'static str },
    #[error("{field} must be a JSON object")]
    NotAnObject { field: &'static str },
    #[error("{field} is not valid JSON: {source}")]
    MalformedJson {
        field: &'static str,
        source: serde_json::Error,
    },
    #[error("{field} is not valid Extended JSON: {source}")]
    ExtJson {
        field: &'static str,
        source: extjson::de::Error,
    },
}

/// Rejects empty names and `system.*` collections.
pub fn collection_name(name: &str) -> Result<&str, ArgError> {
    if name.trim().is_empty() {
        return Err(ArgError::EmptyCollection);
    }
    if name.starts_with(SYSTEM_COLLECTION_PREFIX) {
        return Err(ArgError::SystemCollection);
    }
    Ok(name)
}

/// Converts an object argument into a BSON document.
///
/// A string holding a JSON object is parsed first.
pub fn to_document(value: JsonValue, field: &'static str) -> Result<Document, ArgError> {
    match value {
        JsonValue::String(text) => {
            let parsed = serde_json::from_str::<JsonValue>(&text)
                .map_err(|source| ArgError::MalformedJson { field, source })?;
            match parsed {
                JsonValue::Object(_) => to_document(parsed, field),
                _ => Err(ArgError::NotAnObject { field }),
            }
        }
        JsonValue::Object(_) => match Bson::try_from(value) {
            Ok(Bson::Document(doc)) => Ok(doc),
            // Extended JSON wrappers like {"$oid": ...} parse to scalars.
            Ok(_) => Err(ArgError::NotAnObject { field }),
            Err(source) => Err(ArgError::ExtJson { field, source }),
        },
        _ => Err(ArgError::NotAnObject { field }),
    }
}

/// Like [`to_document`], with a missing or `null` argument meaning `{}`.
pub fn optional_document(
    value: Option<JsonValue>,
    field: &'static str,
) -> Result<Document, ArgError> {
    match value {
        None | Some(JsonValue::Null) => Ok(Document::new()),
        Some(value) => to_document(value, field),
    }
}

pub fn to_documents(values: Vec<JsonValue>, field: &'static str) -> Result<Vec<Document>, ArgError> {
    values
        .into_iter()
        .map(|value| to_document(value, field))
        .collect()
}

/// An index hint is either an index name or a key pattern.
pub fn to_hint(value: JsonValue) -> Result<Hint, ArgError> {
    match value {
        JsonValue::String(name) if name.trim().is_empty() => Err(ArgError::Empty { field: "hint" }),
        JsonValue::String(name) => Ok(Hint::Name(name)),
        other => to_document(other, "hint").map(Hint::Keys),
    }
}

pub fn to_json(value: Bson) -> JsonValue {
    value.into_relaxed_extjson()
}

pub fn documents_to_json(docs: Vec<Document>) -> JsonValue {
    JsonValue::Array(docs.into_iter().map(|doc| to_json(Bson::Document(doc))).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, oid::ObjectId};
    use serde_json::json;

    #[test]
    fn collection_name_rejects_system_and_empty() {
        assert_eq!(collection_name("orders").unwrap(), "orders");
        assert!(matches!(
            collection_name("system.users"),
            Err(ArgError::SystemCollection)
        ));
        assert!(matches!(collection_name("  "), Err(ArgError::EmptyCollection)));
        // Only the prefix is reserved.
        assert!(collection_name("orders.system.archive").is_ok());
    }

    #[test]
    fn object_argument_becomes_document() {
        let doc = to_document(json!({"region": "EU", "total": {"$gt": 100}}), "filter").unwrap();
        assert_eq!(doc, doc! { "region": "EU", "total": { "$gt": 100 } });
    }

    #[test]
    fn string_argument_is_parsed_as_json() {
        let doc = to_document(json!(r#"{"status": "shipped"}"#), "filter").unwrap();
        assert_eq!(doc, doc! { "status": "shipped" });
    }

    #[test]
    fn extended_json_is_understood() {
        let oid = ObjectId::new();
        let doc = to_document(json!({"_id": {"$oid": oid.to_hex()}}), "filter").unwrap();
        assert_eq!(doc.get_object_id("_id").unwrap(), oid);
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(matches!(
            to_document(json!([1, 2]), "filter"),
            Err(ArgError::NotAnObject { field: "filter" })
        ));
        assert!(matches!(
            to_document(json!("[1, 2]"), "projection"),
            Err(ArgError::NotAnObject { field: "projection" })
        ));
        assert!(matches!(
            to_document(json!("{not json"), "filter"),
            Err(ArgError::MalformedJson { .. })
        ));
    }

    #[test]
    fn missing_or_null_means_empty_document() {
        assert!(optional_document(None, "filter").unwrap().is_empty());
        assert!(optional_document(Some(JsonValue::Null), "filter")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn pipeline_stages_convert_in_order() {
        let stages = to_documents(
            vec![json!({"$match": {"region": "EU"}}), json!({"$limit": 5})],
            "pipeline stage",
        )
        .unwrap();
        assert_eq!(stages.len(), 2);
        assert!(stages[0].contains_key("$match"));
        assert!(stages[1].contains_key("$limit"));
    }

    #[test]
    fn hint_accepts_name_or_key_pattern() {
        assert!(matches!(to_hint(json!("region_1")), Ok(Hint::Name(name)) if name == "region_1"));
        assert!(matches!(
            to_hint(json!({"region": 1})),
            Ok(Hint::Keys(keys)) if keys == doc! { "region": 1 }
        ));
        assert!(matches!(to_hint(json!(7)), Err(ArgError::NotAnObject { field: "hint" })));
        assert!(matches!(to_hint(json!("")), Err(ArgError::Empty { field: "hint" })));
    }

    #[test]
    fn results_render_as_relaxed_extended_json() {
        let oid = ObjectId::new();
        let json = documents_to_json(vec![doc! { "_id": oid, "qty": 3_i32 }]);
        assert_eq!(json, json!([{ "_id": { "$oid": oid.to_hex() }, "qty": 3 }]));
    }
}
