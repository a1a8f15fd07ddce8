//! The analytical engine and the session that owns it.
//!
//! [`Engine`] is the seam between the lake logic and DuckDB. Everything the
//! attach sequence and the ingestion loop need from the engine goes through
//! it, which keeps both testable without a real database.

mod duckdb;

pub use self::duckdb::DuckDbEngine;

use std::collections::BTreeSet;
use std::fmt;

use floe_core::SourceKey;
use tracing::debug;

use crate::error::EngineError;
use crate::plan::SecretStatement;
use crate::plan::sql::quote_ident;

/// A scalar bound into a parameterized statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

/// A multi-row insert with one bound parameter per cell.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub columns: Vec<String>,
    /// Every row has exactly `columns.len()` values.
    pub rows: Vec<Vec<SqlValue>>,
}

impl InsertStatement {
    /// Statement text with `?` placeholders.
    ///
    /// ```
    /// use floe::engine::{InsertStatement, SqlValue};
    ///
    /// let insert = InsertStatement {
    ///     table: "events".to_string(),
    ///     columns: vec!["id".to_string(), "user.name".to_string()],
    ///     rows: vec![
    ///         vec![SqlValue::Integer(1), SqlValue::Text("a".to_string())],
    ///         vec![SqlValue::Integer(2), SqlValue::Null],
    ///     ],
    /// };
    /// assert_eq!(
    ///     insert.sql(),
    ///     r#"INSERT INTO "events" ("id", "user.name") VALUES (?, ?), (?, ?)"#
    /// );
    /// ```
    pub fn sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let row = format!("({})", vec!["?"; self.columns.len()].join(", "));
        let values = vec![row.as_str(); self.rows.len()].join(", ");

        format!(
            "INSERT INTO {} ({columns}) VALUES {values}",
            quote_ident(&self.table)
        )
    }

    /// Parameters in placeholder order.
    pub fn params(&self) -> impl Iterator<Item = &SqlValue> {
        self.rows.iter().flatten()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Rows returned by an ad-hoc query, rendered as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let line = |f: &mut fmt::Formatter<'_>, cells: &[String]| -> fmt::Result {
            let padded: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{cell:<width$}"))
                .collect();
            writeln!(f, "| {} |", padded.join(" | "))
        };

        line(f, &self.columns)?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "|-{}-|", rule.join("-|-"))?;
        for row in &self.rows {
            line(f, row)?;
        }
        write!(f, "({} row{})", self.rows.len(), if self.rows.len() == 1 { "" } else { "s" })
    }
}

/// Operations the lake needs from the analytical engine.
///
/// Calls block the calling thread. One session is driven by one task at a time.
pub trait Engine: Send {
    /// Execute one or more statements, discarding any result.
    fn execute(&mut self, sql: &str) -> Result<(), EngineError>;

    /// Names of the tables in the default schema of `catalog`.
    fn list_tables(&mut self, catalog: &str) -> Result<Vec<String>, EngineError>;

    /// Insert all rows of `insert` in a single statement.
    fn insert(&mut self, insert: &InsertStatement) -> Result<usize, EngineError>;

    /// Run a query and collect its rows as text.
    fn query(&mut self, sql: &str) -> Result<QueryResult, EngineError>;
}

/// An engine plus the aliases currently mounted in it.
pub struct EngineSession<E> {
    engine: E,
    attached: BTreeSet<SourceKey>,
}

impl<E: Engine> EngineSession<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            attached: BTreeSet::new(),
        }
    }

    pub fn execute(&mut self, sql: &str) -> Result<(), EngineError> {
        debug!(statement = sql, "Executing");
        self.engine.execute(sql)
    }

    /// Register a secret.
    ///
    /// Neither the log nor the returned error carry the statement text.
    pub fn register_secret(&mut self, secret: &SecretStatement) -> Result<(), EngineError> {
        debug!(secret = secret.name(), "Registering secret");
        self.engine.execute(secret.sql().expose()).map_err(|e| {
            let reason = match &e {
                EngineError::Execute { source, .. } => source.to_string(),
                other => other.to_string(),
            };
            EngineError::RegisterSecret {
                name: secret.name().to_string(),
                reason: secret.redact(&reason),
            }
        })
    }

    /// Execute an attach statement and record `alias` as mounted on success.
    pub fn attach(&mut self, alias: &SourceKey, sql: &str) -> Result<(), EngineError> {
        self.execute(sql)?;
        debug!(%alias, "Alias attached");
        self.attached.insert(alias.clone());
        Ok(())
    }

    pub fn is_attached(&self, alias: &SourceKey) -> bool {
        self.attached.contains(alias)
    }

    /// Aliases mounted in this session, sorted.
    pub fn attached(&self) -> impl Iterator<Item = &SourceKey> {
        self.attached.iter()
    }

    pub fn list_tables(&mut self, catalog: &SourceKey) -> Result<Vec<String>, EngineError> {
        self.engine.list_tables(catalog.id())
    }

    pub fn insert(&mut self, insert: &InsertStatement) -> Result<usize, EngineError> {
        self.engine.insert(insert)
    }

    pub fn query(&mut self, sql: &str) -> Result<QueryResult, EngineError> {
        self.engine.query(sql)
    }

}
