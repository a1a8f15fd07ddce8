//! Decoding payloads and flattening them into rows.

use serde_json::{Map, Value};
use snafu::prelude::*;
use tracing::warn;

use crate::engine::{InsertStatement, SqlValue};
use crate::error::{DecodeSnafu, EmptyPayloadSnafu, NotAnObjectSnafu, StreamError};

/// Joins the keys of nested objects into column names.
pub const SEPARATOR: &str = ".";

/// A flattened record: column name to scalar, list or null.
///
/// Key order follows the payload.
pub type Record = Map<String, Value>;

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decode a payload that must be a JSON object.
pub fn decode(payload: Option<&[u8]>) -> Result<Map<String, Value>, StreamError> {
    let payload = payload.context(EmptyPayloadSnafu)?;
    match serde_json::from_slice::<Value>(payload).context(DecodeSnafu)? {
        Value::Object(object) => Ok(object),
        other => NotAnObjectSnafu {
            kind: kind_name(&other),
        }
        .fail(),
    }
}

/// Flatten nested objects into `parent.child` keys.
///
/// Lists are kept whole. An empty nested object becomes a null under its own
/// key so the column is not lost. When two paths flatten to the same key,
/// such as `{"a.b": 1, "a": {"b": 2}}`, the later value wins and the
/// collision is logged.
///
/// ```
/// use floe::stream::record::flatten;
/// use serde_json::json;
///
/// let object = json!({"id": 1, "user": {"name": "a", "geo": {"lat": 1.5}}, "tags": ["x"]});
/// let record = flatten(object.as_object().unwrap().clone());
///
/// let keys: Vec<_> = record.keys().map(String::as_str).collect();
/// assert_eq!(keys, ["id", "user.name", "user.geo.lat", "tags"]);
/// ```
pub fn flatten(object: Map<String, Value>) -> Record {
    let mut record = Record::new();
    flatten_into(&mut record, None, object);
    record
}

fn flatten_into(record: &mut Record, prefix: Option<&str>, object: Map<String, Value>) {
    for (key, value) in object {
        let key = match prefix {
            Some(prefix) => format!("{prefix}{SEPARATOR}{key}"),
            None => key,
        };

        match value {
            Value::Object(nested) if nested.is_empty() => put(record, key, Value::Null),
            Value::Object(nested) => flatten_into(record, Some(&key), nested),
            other => put(record, key, other),
        }
    }
}

fn put(record: &mut Record, key: String, value: Value) {
    if record.contains_key(&key) {
        warn!(column = %key, "Flattened key collides with an earlier one, keeping the later value");
    }
    record.insert(key, value);
}

/// Convert a flattened value into a bound parameter.
///
/// Lists (and objects, which only survive flattening when nested in lists)
/// are bound as their JSON text.
pub fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// Build one insert over `records`.
///
/// Columns are the union of all keys in first-seen order. A record without
/// a column gets a null for it.
pub fn build_insert(table: &str, records: &[Record]) -> InsertStatement {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let rows = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|column| record.get(column).map_or(SqlValue::Null, to_sql_value))
                .collect()
        })
        .collect();

    InsertStatement {
        table: table.to_string(),
        columns,
        rows,
    }
}
