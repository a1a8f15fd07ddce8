//! Table schema inference from a sample record.

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::consumer::{Delivery, MessageSource};
use super::record::{Record, decode, flatten};
use crate::engine::{Engine, EngineSession};
use crate::error::StreamError;
use crate::plan::sql::quote_ident;

/// The closed set of value kinds a sample can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Float,
    Text,
    Boolean,
    List,
    Map,
    /// Null, the only value that says nothing about its column.
    Other,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Number(n) if n.is_i64() => ValueKind::Integer,
            // Includes unsigned values past i64::MAX, which are bound as floats.
            Value::Number(_) => ValueKind::Float,
            Value::String(_) => ValueKind::Text,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Array(_) => ValueKind::List,
            Value::Object(_) => ValueKind::Map,
            Value::Null => ValueKind::Other,
        }
    }

    /// Column type for this kind. Unknown kinds fall back to text.
    pub fn column_type(self) -> ColumnType {
        match self {
            ValueKind::Integer => ColumnType::Integer,
            ValueKind::Float => ColumnType::Float,
            ValueKind::Text => ColumnType::Varchar,
            ValueKind::Boolean => ColumnType::Boolean,
            ValueKind::List | ValueKind::Map => ColumnType::Jsonb,
            ValueKind::Other => ColumnType::Text,
        }
    }
}

/// Inferred column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Varchar,
    Boolean,
    Jsonb,
    Text,
}

impl ColumnType {
    /// Name the type is reported under.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Float => "FLOAT",
            ColumnType::Varchar => "VARCHAR",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Jsonb => "JSONB",
            ColumnType::Text => "TEXT",
        }
    }

    /// Engine type used in `CREATE TABLE`.
    ///
    /// Widths match the bound values: integers are bound as 64-bit, floats as
    /// doubles, lists and maps as JSON text.
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "DOUBLE",
            ColumnType::Jsonb => "JSON",
            other => other.name(),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered column definitions derived from one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferredSchema {
    columns: Vec<(String, ColumnType)>,
}

impl InferredSchema {
    /// Infer one column per key, in key order.
    ///
    /// ```
    /// use floe::stream::record::flatten;
    /// use floe::stream::schema::InferredSchema;
    /// use serde_json::json;
    ///
    /// let sample = json!({"id": 1, "region": "west", "tags": ["a", "b"]});
    /// let schema = InferredSchema::infer(&flatten(sample.as_object().unwrap().clone()));
    /// assert_eq!(schema.to_string(), "id INTEGER, region VARCHAR, tags JSONB");
    /// ```
    pub fn infer(record: &Record) -> Self {
        let columns = record
            .iter()
            .map(|(key, value)| (key.clone(), ValueKind::of(value).column_type()))
            .collect();
        Self { columns }
    }

    pub fn columns(&self) -> &[(String, ColumnType)] {
        &self.columns
    }

    /// `CREATE TABLE IF NOT EXISTS` for `table` with these columns.
    pub fn create_table_sql(&self, table: &str) -> String {
        let columns = self
            .columns
            .iter()
            .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.as_sql()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE IF NOT EXISTS {} ({columns})", quote_ident(table))
    }
}

impl fmt::Display for InferredSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|(name, ty)| format!("{name} {ty}"))
            .collect();
        f.write_str(&columns.join(", "))
    }
}

/// Wait for the first decodable record and create `table` from it.
///
/// Polls without an upper bound on the wait; only shutdown ends it early.
/// The sample is returned so it can be written with the first batch, its
/// offset has not been committed.
pub async fn infer_and_create<E: Engine>(
    consumer: &mut dyn MessageSource,
    session: &mut EngineSession<E>,
    table: &str,
    poll_timeout: Duration,
    shutdown: &CancellationToken,
) -> Result<(InferredSchema, Record), StreamError> {
    let sample = loop {
        let delivery = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                return Err(StreamError::InferenceCancelled { table: table.to_string() });
            }
            delivery = consumer.recv(poll_timeout) => delivery,
        };

        match delivery {
            None => debug!(table, "No sample yet, polling again"),
            Some(Delivery::PartitionEof { partition }) => {
                debug!(table, partition, "Reached end of partition while sampling")
            }
            Some(Delivery::Error(e)) => warn!(table, "Broker error while sampling: {}", e),
            Some(Delivery::Message {
                topic,
                offset,
                payload,
                ..
            }) => match decode(payload.as_deref()) {
                Ok(object) => break flatten(object),
                Err(e) => error!(table, %topic, offset, "Sample is not usable: {}", e),
            },
        }
    };

    let schema = InferredSchema::infer(&sample);
    let sql = schema.create_table_sql(table);
    session
        .execute(&sql)
        .map_err(|source| StreamError::CreateTable {
            table: table.to_string(),
            source,
        })?;

    info!(table, schema = %schema, "Target table ready");
    Ok((schema, sample))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SqlValue;
    use crate::stream::record::to_sql_value;
    use serde_json::json;

    fn schema(value: Value) -> InferredSchema {
        InferredSchema::infer(&value.as_object().unwrap().clone())
    }

    #[test]
    fn test_every_kind_maps_to_one_type() {
        let schema = schema(json!({
            "i": -3,
            "u": 18446744073709551615u64,
            "f": 1.25,
            "s": "x",
            "b": false,
            "l": [1],
            "m": {"k": 1},
            "n": null
        }));

        let types: Vec<_> = schema.columns().iter().map(|(_, t)| t.name()).collect();
        assert_eq!(
            types,
            ["INTEGER", "FLOAT", "FLOAT", "VARCHAR", "BOOLEAN", "JSONB", "JSONB", "TEXT"]
        );
    }

    #[test]
    fn test_unsigned_past_i64_binds_like_its_column() {
        let value = json!(18446744073709551615u64);
        assert_eq!(ValueKind::of(&value).column_type(), ColumnType::Float);
        assert!(matches!(to_sql_value(&value), SqlValue::Float(_)));

        let value = json!(i64::MAX);
        assert_eq!(ValueKind::of(&value).column_type(), ColumnType::Integer);
        assert_eq!(to_sql_value(&value), SqlValue::Integer(i64::MAX));
    }

    #[test]
    fn test_sample_scenario_reported_and_created() {
        let schema = schema(json!({"id": 1, "region": "west", "tags": ["a", "b"]}));
        assert_eq!(schema.to_string(), "id INTEGER, region VARCHAR, tags JSONB");
        assert_eq!(
            schema.create_table_sql("orders"),
            r#"CREATE TABLE IF NOT EXISTS "orders" ("id" BIGINT, "region" VARCHAR, "tags" JSON)"#
        );
    }

    #[test]
    fn test_create_table_sql_quotes_names() {
        let sql = schema(json!({"id": 1, "user.name": "a"})).create_table_sql("events");
        assert_eq!(
            sql,
            r#"CREATE TABLE IF NOT EXISTS "events" ("id" BIGINT, "user.name" VARCHAR)"#
        );
    }

    #[test]
    fn test_flattened_sample_has_no_map_columns() {
        let record = flatten(
            json!({"id": 1, "geo": {"lat": 1.5, "lon": 2.5}})
                .as_object()
                .unwrap()
                .clone(),
        );
        assert_eq!(
            InferredSchema::infer(&record).to_string(),
            "id INTEGER, geo.lat FLOAT, geo.lon FLOAT"
        );
    }
}
