//! Mounting every configured endpoint into one engine session.
//!
//! The [`Orchestrator`] walks a fixed sequence:
//!
//! ```text
//! Cold -> Attaching -> Verifying -> Ready
//!                          |
//!                          v
//!                    Provisioning -> Attaching -> Verifying -> Ready
//! ```
//!
//! Any fatal error moves the sequence to `Failed`.
//!
//! Source failures are isolated and reported per alias. Only the lake
//! catalog is mandatory: if it cannot be attached, or it is attached but
//! holds no tables, the destination is provisioned and the sequence runs once
//! more. A failure after provisioning ends the process.

use std::fmt;

use floe_core::SourceKey;
use floe_core::emit;
use floe_core::metrics::events::{
    AttachStatus, CatalogProvisioned, EndpointAttached, ExtensionLoaded,
};
use snafu::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::assess::{Assessor, Ready};
use crate::config::{Destination, SourceRegistry};
use crate::engine::{Engine, EngineSession};
use crate::error::{
    AssessSnafu, AttachError, CatalogPlanSnafu, CatalogUnavailableSnafu, EngineError,
    ExtensionNameSnafu, ExtensionSnafu, UseCatalogSnafu,
};
use crate::plan::{self, Statement};

/// Where the attach sequence currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    Cold,
    Attaching,
    Verifying,
    Provisioning,
    Ready,
    Failed,
}

impl fmt::Display for AttachState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttachState::Cold => "cold",
            AttachState::Attaching => "attaching",
            AttachState::Verifying => "verifying",
            AttachState::Provisioning => "provisioning",
            AttachState::Ready => "ready",
            AttachState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Kind of endpoint an alias refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    DestinationStorage,
    ObjectStorage,
    Postgres,
    Catalog,
}

impl EndpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::DestinationStorage => "destination_storage",
            EndpointKind::ObjectStorage => "object_storage",
            EndpointKind::Postgres => "postgres",
            EndpointKind::Catalog => "catalog",
        }
    }
}

/// Result of mounting one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointOutcome {
    Attached,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointStatus {
    pub alias: SourceKey,
    pub kind: EndpointKind,
    pub outcome: EndpointOutcome,
}

impl EndpointStatus {
    pub fn is_attached(&self) -> bool {
        self.outcome == EndpointOutcome::Attached
    }
}

/// Per-alias outcome of an attach pass, in attach order.
#[derive(Debug, Clone, Default)]
pub struct AttachReport {
    statuses: Vec<EndpointStatus>,
}

impl AttachReport {
    fn record(&mut self, alias: &SourceKey, kind: EndpointKind, outcome: EndpointOutcome) {
        let status = match outcome {
            EndpointOutcome::Attached => AttachStatus::Attached,
            EndpointOutcome::Failed { .. } => AttachStatus::Failed,
        };
        emit!(EndpointAttached {
            kind: kind.as_str(),
            status,
        });

        self.statuses.push(EndpointStatus {
            alias: alias.clone(),
            kind,
            outcome,
        });
    }

    pub fn statuses(&self) -> &[EndpointStatus] {
        &self.statuses
    }

    pub fn failed(&self) -> impl Iterator<Item = &EndpointStatus> {
        self.statuses.iter().filter(|s| !s.is_attached())
    }

    /// Whether some source could not be mounted.
    pub fn is_degraded(&self) -> bool {
        self.failed().next().is_some()
    }
}

/// A session with the lake catalog selected as default database.
pub struct AttachedSession<E> {
    pub session: EngineSession<E>,
    pub report: AttachReport,
    /// Tables visible in the catalog when it became ready.
    pub tables: Vec<String>,
    /// Set when the destination had to be provisioned.
    pub provisioned: Option<Ready>,
}

struct AttachPass {
    report: AttachReport,
    catalog: Result<(), EngineError>,
}

/// Drives the attach sequence.
pub struct Orchestrator {
    assessor: Assessor,
    extensions: Vec<String>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(assessor: Assessor, extensions: Vec<String>, shutdown: CancellationToken) -> Self {
        Self {
            assessor,
            extensions,
            shutdown,
        }
    }

    /// Attach all sources and the lake catalog to `engine`.
    pub async fn attach<E: Engine>(
        &self,
        engine: E,
        sources: &SourceRegistry,
        destination: &Destination,
    ) -> Result<AttachedSession<E>, AttachError> {
        let mut state = AttachState::Cold;
        let result = self.run(&mut state, engine, sources, destination).await;

        if let Err(e) = &result {
            error!(state = %state, error = %e, "Attach sequence failed");
            transition(&mut state, AttachState::Failed);
        }
        result
    }

    async fn run<E: Engine>(
        &self,
        state: &mut AttachState,
        engine: E,
        sources: &SourceRegistry,
        destination: &Destination,
    ) -> Result<AttachedSession<E>, AttachError> {
        let catalog = &destination.catalog.alias;
        let mut session = EngineSession::new(engine);

        transition(state, AttachState::Attaching);
        let pass = attach_endpoints(&mut session, sources, destination)?;

        transition(state, AttachState::Verifying);
        let missing = match pass.catalog {
            Err(e) => format!("attach failed: {e}"),
            Ok(()) => match session.list_tables(catalog) {
                Ok(tables) if !tables.is_empty() => {
                    info!(%catalog, tables = tables.len(), "Attached existing lake");
                    return self.ready(state, session, pass.report, tables, None, catalog);
                }
                Ok(_) => "catalog has no tables".to_string(),
                Err(e) => format!("listing tables failed: {e}"),
            },
        };

        warn!(%catalog, reason = %missing, "Catalog not found, provisioning");
        transition(state, AttachState::Provisioning);
        let ready = self
            .assessor
            .ensure_ready(
                &destination.storage.connection,
                &destination.catalog.connection,
                &self.shutdown,
            )
            .await
            .context(AssessSnafu)?;
        self.install_extensions(&mut session)?;
        emit!(CatalogProvisioned {
            alias: catalog.to_string(),
        });

        transition(state, AttachState::Attaching);
        let pass = attach_endpoints(&mut session, sources, destination)?;
        pass.catalog
            .context(CatalogUnavailableSnafu { alias: catalog.id() })?;

        transition(state, AttachState::Verifying);
        let tables = session
            .list_tables(catalog)
            .context(CatalogUnavailableSnafu { alias: catalog.id() })?;
        if tables.is_empty() {
            // An empty catalog and a missing one look the same from here, so
            // a legitimately empty lake goes through provisioning on every start.
            warn!(%catalog, "Catalog is still empty after provisioning, continuing with an empty lake");
        }

        self.ready(state, session, pass.report, tables, Some(ready), catalog)
    }

    fn ready<E: Engine>(
        &self,
        state: &mut AttachState,
        mut session: EngineSession<E>,
        report: AttachReport,
        tables: Vec<String>,
        provisioned: Option<Ready>,
        catalog: &SourceKey,
    ) -> Result<AttachedSession<E>, AttachError> {
        let sql = plan::use_database(catalog).context(CatalogPlanSnafu { alias: catalog.id() })?;
        session
            .execute(&sql)
            .context(UseCatalogSnafu { alias: catalog.id() })?;

        for status in report.failed() {
            warn!(alias = %status.alias, kind = status.kind.as_str(), "Endpoint not attached, continuing without it");
        }
        transition(state, AttachState::Ready);

        Ok(AttachedSession {
            session,
            report,
            tables,
            provisioned,
        })
    }

    fn install_extensions<E: Engine>(&self, session: &mut EngineSession<E>) -> Result<(), AttachError> {
        for extension in &self.extensions {
            let sql = plan::install_extension(extension).context(ExtensionNameSnafu { extension })?;
            session.execute(&sql).context(ExtensionSnafu { extension })?;
            info!(%extension, "Extension installed and loaded");
            emit!(ExtensionLoaded {
                extension: extension.clone(),
            });
        }
        Ok(())
    }
}

fn transition(state: &mut AttachState, next: AttachState) {
    debug!(from = %state, to = %next, "Attach state transition");
    *state = next;
}

fn execute<E: Engine>(
    session: &mut EngineSession<E>,
    alias: &SourceKey,
    statement: &Statement,
    mounts: bool,
) -> Result<(), EngineError> {
    match statement {
        Statement::Secret(secret) => session.register_secret(secret),
        Statement::Ready(sql) if mounts => session.attach(alias, sql),
        Statement::Ready(sql) => session.execute(sql),
        Statement::Fallback { .. } => session.execute(plan::NOOP),
    }
}

/// Run one endpoint's statements in order, stopping at the first failure.
///
/// With `mount` set, the last statement mounts `alias` in the session.
fn run_endpoint<E: Engine>(
    session: &mut EngineSession<E>,
    report: &mut AttachReport,
    kind: EndpointKind,
    alias: &SourceKey,
    statements: &[Statement],
    mount: bool,
) {
    for (i, statement) in statements.iter().enumerate() {
        let mounts = mount && i + 1 == statements.len();
        debug!(%alias, kind = kind.as_str(), step = i + 1, "Executing endpoint statement");
        let result = execute(session, alias, statement, mounts);

        let reason = match (statement, result) {
            (Statement::Fallback { reason, .. }, _) => reason.to_string(),
            (_, Err(e)) => {
                error!(%alias, kind = kind.as_str(), error = %e, "Failed to register endpoint");
                e.to_string()
            }
            (_, Ok(())) => continue,
        };

        report.record(alias, kind, EndpointOutcome::Failed { reason });
        return;
    }

    report.record(alias, kind, EndpointOutcome::Attached);
}

/// Register every secret and attach every endpoint.
///
/// Order matters: the destination storage secret must exist before the
/// catalog attach references its scope.
fn attach_endpoints<E: Engine>(
    session: &mut EngineSession<E>,
    sources: &SourceRegistry,
    destination: &Destination,
) -> Result<AttachPass, AttachError> {
    let mut report = AttachReport::default();

    let storage = &destination.storage;
    info!(alias = %storage.alias, "Registering destination storage secret");
    let secret = Statement::soft(
        &storage.alias,
        plan::storage_secret(&storage.secret_name(), &storage.connection),
    );
    run_endpoint(session, &mut report, EndpointKind::DestinationStorage, &storage.alias, &[secret], false);

    for (alias, descriptor) in &sources.storage {
        info!(%alias, "Registering object storage source");
        let secret = Statement::soft(
            alias,
            plan::storage_secret(&alias.secret_name(Some("secret")), descriptor),
        );
        run_endpoint(session, &mut report, EndpointKind::ObjectStorage, alias, &[secret], true);
    }

    for (alias, descriptor) in &sources.postgres {
        info!(%alias, "Registering postgres source");
        let statements = [
            Statement::soft(alias, plan::postgres_secret(&alias.secret_name(Some("secret")), descriptor)),
            Statement::soft(alias, plan::postgres_attach(alias, descriptor)),
        ];
        run_endpoint(session, &mut report, EndpointKind::Postgres, alias, &statements, true);
    }

    let catalog = &destination.catalog;
    let alias = &catalog.alias;
    let secret = Statement::soft(alias, plan::postgres_secret(&catalog.secret_name(), &catalog.connection));
    if let Err(e) = execute(session, alias, &secret, false) {
        error!(%alias, error = %e, "Failed to register catalog secret");
    }

    let sql = plan::catalog_attach(catalog, storage).context(CatalogPlanSnafu { alias: alias.id() })?;
    info!(%alias, statement = %sql, "Attaching lake catalog");
    let result = session.attach(alias, &sql);
    let outcome = match &result {
        Ok(()) => EndpointOutcome::Attached,
        Err(e) => EndpointOutcome::Failed {
            reason: e.to_string(),
        },
    };
    report.record(alias, EndpointKind::Catalog, outcome);

    Ok(AttachPass {
        report,
        catalog: result,
    })
}
