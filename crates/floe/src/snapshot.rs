//! Time travel over the lake's snapshot history.
//!
//! Every commit to a DuckLake catalog creates a snapshot that records which
//! kinds of change it made. [`inspect_change`] finds the most recent snapshot
//! with a given kind of change and reads a table as it was one snapshot
//! earlier, which is how an unexpected delete or insert is investigated.

use std::fmt;

use clap::ValueEnum;
use floe_core::SourceKey;
use snafu::prelude::*;
use tracing::{debug, info};

use crate::engine::{Engine, EngineSession, QueryResult};
use crate::error::{ListSnapshotsSnafu, SnapshotError, SnapshotIdSnafu, TimeTravelSnafu};
use crate::plan::sql::{quote_ident, quote_literal};

/// How many recent snapshots are searched.
pub const SNAPSHOT_WINDOW: usize = 10;

/// Kind of change recorded in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChangeKind {
    /// Rows were inserted into a table.
    Inserted,
    /// Rows were deleted from a table.
    Deleted,
}

impl ChangeKind {
    /// Key of this change in the snapshot's change map.
    pub fn key(&self) -> &'static str {
        match self {
            ChangeKind::Inserted => "tables_inserted_into",
            ChangeKind::Deleted => "tables_deleted_from",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One entry of the snapshot history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: i64,
    pub time: String,
    /// Change keys recorded for the snapshot.
    pub changes: Vec<String>,
}

impl Snapshot {
    pub fn has(&self, change: ChangeKind) -> bool {
        self.changes.iter().any(|c| c == change.key())
    }
}

/// The latest snapshot with a change, and the table just before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeInspection {
    pub change: ChangeKind,
    pub snapshot: i64,
    /// The snapshot before `snapshot`, if it is within the searched window.
    pub previous: Option<i64>,
    /// Table contents at `previous`.
    pub before: Option<QueryResult>,
}

fn list_sql(catalog: &SourceKey) -> String {
    format!(
        "SELECT snapshot_id, CAST(snapshot_time AS VARCHAR) AS snapshot_time, \
         array_to_string(map_keys(changes), ',') AS changes \
         FROM ducklake_snapshots({}) ORDER BY snapshot_id DESC LIMIT {SNAPSHOT_WINDOW}",
        quote_literal(catalog.id())
    )
}

/// `SELECT *` from `table` as of snapshot `version`.
pub fn time_travel_sql(table: &str, version: i64) -> String {
    format!("SELECT * FROM {} AT (VERSION => {version})", quote_ident(table))
}

/// The most recent snapshots of `catalog`, newest first.
pub fn recent_snapshots<E: Engine>(
    session: &mut EngineSession<E>,
    catalog: &SourceKey,
) -> Result<Vec<Snapshot>, SnapshotError> {
    let result = session
        .query(&list_sql(catalog))
        .context(ListSnapshotsSnafu { catalog: catalog.id() })?;

    result
        .rows
        .into_iter()
        .map(|row| -> Result<Snapshot, SnapshotError> {
            let mut cells = row.into_iter();
            let id = cells.next().unwrap_or_default();
            let time = cells.next().unwrap_or_default();
            let changes = cells.next().unwrap_or_default();

            let id = id.parse::<i64>().ok().context(SnapshotIdSnafu { value: id })?;
            let changes = changes
                .split(',')
                .filter(|c| !c.is_empty() && *c != "NULL")
                .map(str::to_string)
                .collect();
            Ok(Snapshot { id, time, changes })
        })
        .collect()
}

/// Find the latest snapshot with `change` and read `table` as it was before.
///
/// Returns `None` when no recent snapshot recorded that kind of change.
pub fn inspect_change<E: Engine>(
    session: &mut EngineSession<E>,
    catalog: &SourceKey,
    table: &str,
    change: ChangeKind,
) -> Result<Option<ChangeInspection>, SnapshotError> {
    let snapshots = recent_snapshots(session, catalog)?;
    for snapshot in &snapshots {
        debug!(id = snapshot.id, time = %snapshot.time, changes = ?snapshot.changes, "Snapshot");
    }

    let Some(position) = snapshots.iter().position(|s| s.has(change)) else {
        info!(%catalog, %change, searched = snapshots.len(), "No recent snapshot with this change");
        return Ok(None);
    };

    let snapshot = snapshots[position].id;
    let previous = snapshots.get(position + 1).map(|s| s.id);
    info!(%catalog, %change, snapshot, ?previous, "Found change");

    let before = match previous {
        Some(version) => Some(
            session
                .query(&time_travel_sql(table, version))
                .context(TimeTravelSnafu { table, version })?,
        ),
        None => None,
    };

    Ok(Some(ChangeInspection {
        change,
        snapshot,
        previous,
        before,
    }))
}
