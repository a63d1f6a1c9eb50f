use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// A record read from or written to either store: an identifier plus a JSON
/// field map. Timestamp fields surface as epoch milliseconds regardless of
/// what the backend stored; backend-native timestamp shapes never reach
/// callers.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    id: String,
    fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    /// Resolves a possibly dotted field path (`price.amount`) against the
    /// field map.
    pub fn field(&self, path: &str) -> Option<&Value> {
        field_value(&self.fields, path)
    }

    pub fn created_at(&self) -> Option<i64> {
        self.fields.get(CREATED_AT_FIELD).and_then(Value::as_i64)
    }

    pub fn updated_at(&self) -> Option<i64> {
        self.fields.get(UPDATED_AT_FIELD).and_then(Value::as_i64)
    }
}

/// Dotted-path lookup over a raw field map.
pub(crate) fn field_value<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = fields.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Stamps both audit fields for a fresh write.
pub(crate) fn stamp_create(fields: &mut Map<String, Value>, at: i64) {
    fields.insert(CREATED_AT_FIELD.to_string(), Value::from(at));
    fields.insert(UPDATED_AT_FIELD.to_string(), Value::from(at));
}

/// Stamps only `updatedAt`; `createdAt` is owned by the original write.
pub(crate) fn stamp_update(fields: &mut Map<String, Value>, at: i64) {
    fields.insert(UPDATED_AT_FIELD.to_string(), Value::from(at));
}

/// Rewrites the audit fields to epoch milliseconds. Backends may hand back
/// millis (ours), RFC3339 strings (REST document stores), or
/// `{seconds, nanos}` maps; all three collapse to one representation here.
pub(crate) fn normalize_timestamps(fields: &mut Map<String, Value>) {
    for key in [CREATED_AT_FIELD, UPDATED_AT_FIELD] {
        if let Some(value) = fields.get(key) {
            if let Some(millis) = timestamp_millis(value) {
                fields.insert(key.to_string(), Value::from(millis));
            }
        }
    }
}

fn timestamp_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc).timestamp_millis()),
        Value::Object(map) => {
            let seconds = map.get("seconds").and_then(Value::as_i64)?;
            let nanos = map.get("nanos").and_then(Value::as_i64).unwrap_or(0);
            Some(seconds * 1_000 + nanos / 1_000_000)
        }
        _ => None,
    }
}

/// Materializes the children of a tree node into documents, keyed by child
/// name, in key order. Non-object children are skipped; the push store only
/// holds documents as objects under their collection node.
pub(crate) fn documents_from_tree(value: &Value) -> Vec<Document> {
    let Some(children) = value.as_object() else {
        return Vec::new();
    };
    let mut documents = Vec::with_capacity(children.len());
    let mut keys: Vec<&String> = children.keys().collect();
    keys.sort();
    for key in keys {
        if let Some(Value::Object(fields)) = children.get(key) {
            let mut fields = fields.clone();
            normalize_timestamps(&mut fields);
            documents.push(Document::new(key.clone(), fields));
        }
    }
    documents
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dotted_lookup_descends_nested_maps() {
        let fields = json!({"price": {"amount": 100, "currency": "GBP"}})
            .as_object()
            .cloned()
            .unwrap();
        let doc = Document::new("p1", fields);
        assert_eq!(doc.field("price.amount"), Some(&json!(100)));
        assert_eq!(doc.field("price.missing"), None);
        assert_eq!(doc.field("price.amount.deeper"), None);
    }

    #[test]
    fn normalizes_all_timestamp_shapes_to_millis() {
        let mut fields = json!({
            "createdAt": "2026-03-01T12:00:00Z",
            "updatedAt": {"seconds": 1_700_000_000, "nanos": 250_000_000}
        })
        .as_object()
        .cloned()
        .unwrap();
        normalize_timestamps(&mut fields);
        assert_eq!(
            fields.get("createdAt").and_then(Value::as_i64),
            Some(1_772_366_400_000)
        );
        assert_eq!(
            fields.get("updatedAt").and_then(Value::as_i64),
            Some(1_700_000_000_250)
        );
    }

    #[test]
    fn tree_materialization_skips_non_objects() {
        let tree = json!({
            "b": {"content": "second"},
            "a": {"content": "first"},
            "junk": 42
        });
        let documents = documents_from_tree(&tree);
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].id(), "a");
        assert_eq!(documents[1].id(), "b");
    }
}
