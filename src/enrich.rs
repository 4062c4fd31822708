//! Record enrichment with parent keys

use crate::types::{JsonObject, JsonValue, Record};

/// Copy parent keys into a record
///
/// Parent keys overwrite same-named fields. Non-object records are wrapped
/// as `{"value": record}` first so the keys always land somewhere.
pub fn enrich(record: Record, parent_keys: &JsonObject) -> Record {
    let mut object = match record {
        JsonValue::Object(object) => object,
        other => {
            let mut object = JsonObject::new();
            object.insert("value".to_string(), other);
            object
        }
    };

    for (key, value) in parent_keys {
        object.insert(key.clone(), value.clone());
    }
    JsonValue::Object(object)
}
