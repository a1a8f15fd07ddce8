//! DuckDB implementation of [`Engine`].

use std::path::Path;

use ::duckdb::types::{ToSqlOutput, Value};
use ::duckdb::{Connection, ToSql, params_from_iter};
use snafu::prelude::*;
use tracing::info;

use super::{Engine, InsertStatement, QueryResult, SqlValue};
use crate::error::{BoxError, EngineError, InsertSnafu, OpenSnafu};

const LIST_TABLES: &str = "SELECT table_name FROM duckdb_tables() \
     WHERE database_name = ? AND schema_name = 'main' ORDER BY table_name";

/// An embedded DuckDB database.
pub struct DuckDbEngine {
    connection: Connection,
}

impl DuckDbEngine {
    /// Open an in-memory database.
    pub fn in_memory() -> Result<Self, EngineError> {
        let connection = Connection::open_in_memory()
            .map_err(|e| Box::new(e) as BoxError)
            .context(OpenSnafu)?;
        info!("Opened in-memory engine");
        Ok(Self { connection })
    }

    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let connection = Connection::open(path)
            .map_err(|e| Box::new(e) as BoxError)
            .context(OpenSnafu)?;
        info!(path = %path.display(), "Opened engine");
        Ok(Self { connection })
    }

    /// Open a file database when `path` is set, otherwise an in-memory one.
    pub fn from_path(path: Option<&str>) -> Result<Self, EngineError> {
        match path {
            Some(path) => Self::open(path),
            None => Self::in_memory(),
        }
    }
}

fn execute_failed(statement: &str) -> impl FnOnce(::duckdb::Error) -> EngineError + '_ {
    move |e| EngineError::Execute {
        statement: statement.to_string(),
        source: Box::new(e),
    }
}

impl Engine for DuckDbEngine {
    fn execute(&mut self, sql: &str) -> Result<(), EngineError> {
        self.connection
            .execute_batch(sql)
            .map_err(execute_failed(sql))
    }

    fn list_tables(&mut self, catalog: &str) -> Result<Vec<String>, EngineError> {
        let mut statement = self
            .connection
            .prepare(LIST_TABLES)
            .map_err(execute_failed(LIST_TABLES))?;
        let names = statement
            .query_map([catalog], |row| row.get::<_, String>(0))
            .map_err(execute_failed(LIST_TABLES))?;

        names
            .collect::<Result<Vec<_>, _>>()
            .map_err(execute_failed(LIST_TABLES))
    }

    fn insert(&mut self, insert: &InsertStatement) -> Result<usize, EngineError> {
        let sql = insert.sql();
        self.connection
            .execute(&sql, params_from_iter(insert.params()))
            .map_err(|e| Box::new(e) as BoxError)
            .context(InsertSnafu {
                table: insert.table.clone(),
            })
    }

    fn query(&mut self, sql: &str) -> Result<QueryResult, EngineError> {
        let mut statement = self.connection.prepare(sql).map_err(execute_failed(sql))?;
        let mut rows = statement.query([]).map_err(execute_failed(sql))?;

        let columns = rows.as_ref().map(|s| s.column_names()).unwrap_or_default();
        let mut result = QueryResult {
            columns,
            rows: Vec::new(),
        };
        while let Some(row) = rows.next().map_err(execute_failed(sql))? {
            let mut cells = Vec::with_capacity(result.columns.len());
            for i in 0..result.columns.len() {
                let value: Value = row.get(i).map_err(execute_failed(sql))?;
                cells.push(render(value));
            }
            result.rows.push(cells);
        }

        Ok(result)
    }
}

fn render(value: Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::TinyInt(i) => i.to_string(),
        Value::SmallInt(i) => i.to_string(),
        Value::Int(i) => i.to_string(),
        Value::BigInt(i) => i.to_string(),
        Value::HugeInt(i) => i.to_string(),
        Value::UTinyInt(i) => i.to_string(),
        Value::USmallInt(i) => i.to_string(),
        Value::UInt(i) => i.to_string(),
        Value::UBigInt(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Double(f) => f.to_string(),
        Value::Text(s) => s,
        other => format!("{other:?}"),
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> ::duckdb::Result<ToSqlOutput<'_>> {
        let value = match self {
            SqlValue::Null => Value::Null,
            SqlValue::Boolean(b) => Value::Boolean(*b),
            SqlValue::Integer(i) => Value::BigInt(*i),
            SqlValue::Float(f) => Value::Double(*f),
            SqlValue::Text(s) => Value::Text(s.clone()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}
