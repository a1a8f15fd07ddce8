//! Wiring a loaded [`Config`] into a running process.
//!
//! Every entry point attaches the full set of endpoints first. `run_attach`
//! then ingests the configured stream until shutdown, `run_query` runs one
//! statement against the attached session and `run_snapshots` inspects the
//! lake's snapshot history.

use floe_core::init_metrics;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::assess::{Assessor, PostgresCatalogAdmin, S3BucketAdmin};
use crate::attach::{AttachedSession, Orchestrator};
use crate::config::Config;
use crate::engine::{DuckDbEngine, QueryResult};
use crate::error::{LakeError, StreamError};
use crate::snapshot::{self, ChangeInspection, ChangeKind};
use crate::stream::{self, ConsumerSet, IngestStats, KafkaConsumerFactory};

/// Orchestrator backed by the real object storage and catalog admin clients.
pub fn orchestrator(config: &Config, shutdown: &CancellationToken) -> Result<Orchestrator, LakeError> {
    let destination = &config.destination;
    let assessor = Assessor::new(
        S3BucketAdmin::new(&destination.storage.connection),
        PostgresCatalogAdmin::new(&destination.catalog.connection)?,
        config.assessment.backoff(),
    );
    Ok(Orchestrator::new(
        assessor,
        config.engine.extensions.clone(),
        shutdown.clone(),
    ))
}

/// Log the configured endpoints at startup.
pub fn log_startup_info(config: &Config) {
    let stream = &config.source.stream;
    info!(
        "Attaching {} endpoint(s) into lake '{}'",
        config.attached_aliases().len() + 1,
        config.destination.catalog.alias
    );
    for (alias, storage) in &config.source.storage {
        info!("  Object storage: {} ({})", alias, storage.bucket_url());
    }
    for (alias, postgres) in &config.source.postgres {
        info!("  Postgres: {} ({})", alias, postgres);
    }
    info!(
        "  Stream: {:?} -> {} (group {}, {:?} mode)",
        stream.topics, stream.table, stream.group_id, stream.mode
    );
}

async fn attach(
    config: &Config,
    shutdown: &CancellationToken,
) -> Result<AttachedSession<DuckDbEngine>, LakeError> {
    if config.metrics.enabled {
        init_metrics(&config.metrics.address)?;
    }

    let engine = DuckDbEngine::from_path(config.engine.path.as_deref())?;
    let attached = orchestrator(config, shutdown)?
        .attach(engine, &config.source, &config.destination)
        .await?;

    let mounted: Vec<String> = attached.session.attached().map(|a| a.to_string()).collect();
    info!(
        tables = attached.tables.len(),
        provisioned = attached.provisioned.is_some(),
        degraded = attached.report.is_degraded(),
        "Session ready, attached: {}",
        mounted.join(", ")
    );
    Ok(attached)
}

/// Attach everything, then ingest until `shutdown` is cancelled.
pub async fn run_attach(
    config: &Config,
    shutdown: CancellationToken,
) -> Result<IngestStats, LakeError> {
    log_startup_info(config);
    let mut attached = attach(config, &shutdown).await?;

    let stream = &config.source.stream;
    let mut consumers = ConsumerSet::new(KafkaConsumerFactory::new(stream));
    match stream::ingest(&mut consumers, &mut attached.session, stream, &shutdown).await {
        Ok(stats) => Ok(stats),
        Err(StreamError::InferenceCancelled { table }) => {
            info!(%table, "Shutdown before the first record arrived");
            Ok(IngestStats::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// Attach everything and run `sql` against the session.
pub async fn run_query(
    config: &Config,
    sql: &str,
    shutdown: CancellationToken,
) -> Result<QueryResult, LakeError> {
    let mut attached = attach(config, &shutdown).await?;
    Ok(attached.session.query(sql)?)
}

/// Attach everything and inspect the latest snapshot with `change`.
///
/// `table` defaults to the stream's target table.
pub async fn run_snapshots(
    config: &Config,
    table: Option<&str>,
    change: ChangeKind,
    shutdown: CancellationToken,
) -> Result<Option<ChangeInspection>, LakeError> {
    let table = table.unwrap_or(&config.source.stream.table);
    let mut attached = attach(config, &shutdown).await?;
    Ok(snapshot::inspect_change(
        &mut attached.session,
        &config.destination.catalog.alias,
        table,
        change,
    )?)
}
