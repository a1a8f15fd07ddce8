//! The ingestion loops.
//!
//! Batch mode polls up to `batch_size` deliveries, keeps the records that
//! decode, and writes them with one insert. Offsets are committed only after
//! that insert succeeds, so a crash re-delivers the batch (at-least-once).
//! Single mode does the same one message at a time.

use std::time::{Duration, Instant};

use floe_core::emit;
use floe_core::metrics::events::{
    BatchInserted, DeliveriesReceived, DropReason, InsertDuration, RecordsDropped,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::consumer::{ConsumerSet, Delivery, MessageSource};
use super::record::{Record, build_insert, decode, flatten};
use super::schema::infer_and_create;
use crate::config::{IngestMode, StreamDescriptor};
use crate::engine::{Engine, EngineSession};
use crate::error::StreamError;

/// Batches smaller than this are not written.
pub const MIN_BATCH_RECORDS: usize = 2;

/// Counters for one run of an ingestion loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub polls: u64,
    pub deliveries: u64,
    pub rows_inserted: u64,
    pub inserts: u64,
    pub decode_errors: u64,
    pub broker_errors: u64,
    /// Records discarded because their batch was below [`MIN_BATCH_RECORDS`].
    pub below_low_water: u64,
    pub failed_inserts: u64,
    pub failed_commits: u64,
}

/// Loop settings shared by both modes.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub table: String,
    pub batch_size: usize,
    pub poll_timeout: Duration,
}

impl IngestOptions {
    pub fn from_stream(stream: &StreamDescriptor) -> Self {
        Self {
            table: stream.table.clone(),
            batch_size: stream.batch_size,
            poll_timeout: stream.poll_timeout(),
        }
    }
}

/// Open the stream's consumer, create the target table and ingest until
/// shutdown. The consumer is closed on every path out.
pub async fn ingest<E: Engine>(
    consumers: &mut ConsumerSet,
    session: &mut EngineSession<E>,
    stream: &StreamDescriptor,
    shutdown: &CancellationToken,
) -> Result<IngestStats, StreamError> {
    let group = stream.group_id.as_str();
    let consumer = consumers.open(group, &stream.topics)?;

    let result = drive(consumer, session, stream, shutdown).await;

    consumers.close(group).await;
    result
}

async fn drive<E: Engine>(
    consumer: &mut dyn MessageSource,
    session: &mut EngineSession<E>,
    stream: &StreamDescriptor,
    shutdown: &CancellationToken,
) -> Result<IngestStats, StreamError> {
    let options = IngestOptions::from_stream(stream);
    let (_, sample) =
        infer_and_create(consumer, session, &options.table, options.poll_timeout, shutdown).await?;

    let stats = match stream.mode {
        IngestMode::Batch => run_batches(consumer, session, &options, Some(sample), shutdown).await,
        IngestMode::Single => run_single(consumer, session, &options, Some(sample), shutdown).await,
    };

    info!(table = %options.table, ?stats, "Ingestion stopped");
    Ok(stats)
}

/// Insert `records` and commit on success.
///
/// Returns whether the records reached the table.
async fn write<E: Engine>(
    consumer: &mut dyn MessageSource,
    session: &mut EngineSession<E>,
    table: &str,
    records: &[Record],
    stats: &mut IngestStats,
) -> bool {
    let insert = build_insert(table, records);
    let rows = insert.row_count() as u64;

    let start = Instant::now();
    let result = session.insert(&insert);
    emit!(InsertDuration {
        duration: start.elapsed(),
        table: table.to_string(),
    });

    if let Err(e) = result {
        error!(table, rows, error = %e, "Insert failed, dropping records");
        stats.failed_inserts += 1;
        emit!(RecordsDropped {
            count: rows,
            reason: DropReason::InsertFailed,
            table: table.to_string(),
        });
        return false;
    }

    stats.inserts += 1;
    stats.rows_inserted += rows;
    emit!(BatchInserted {
        rows,
        table: table.to_string(),
    });

    if let Err(e) = consumer.commit().await {
        // The rows are in; they will be delivered again after a restart.
        warn!(table, "Commit after insert failed: {}", e);
        stats.failed_commits += 1;
    }
    true
}

/// Poll batches and insert each one until shutdown.
///
/// `sample` is written with the first batch that reaches the table.
pub async fn run_batches<E: Engine>(
    consumer: &mut dyn MessageSource,
    session: &mut EngineSession<E>,
    options: &IngestOptions,
    mut sample: Option<Record>,
    shutdown: &CancellationToken,
) -> IngestStats {
    let table = options.table.as_str();
    let mut stats = IngestStats::default();

    loop {
        let deliveries = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            deliveries = consumer.recv_batch(options.batch_size, options.poll_timeout) => deliveries,
        };
        stats.polls += 1;
        stats.deliveries += deliveries.len() as u64;
        if !deliveries.is_empty() {
            emit!(DeliveriesReceived {
                count: deliveries.len() as u64,
                table: table.to_string(),
            });
        }

        let mut records: Vec<Record> = sample.take().into_iter().collect();
        let carried = records.len();
        let (mut decode_errors, mut broker_errors) = (0, 0);

        for delivery in deliveries {
            match delivery {
                Delivery::Message {
                    topic,
                    partition,
                    offset,
                    payload,
                } => match decode(payload.as_deref()) {
                    Ok(object) => records.push(flatten(object)),
                    Err(e) => {
                        error!(table, %topic, partition, offset, "Dropping undecodable record: {}", e);
                        decode_errors += 1;
                    }
                },
                Delivery::PartitionEof { partition } => {
                    debug!(table, partition, "Reached end of partition");
                }
                Delivery::Error(e) => {
                    warn!(table, "Dropping delivery with broker error: {}", e);
                    broker_errors += 1;
                }
            }
        }

        stats.decode_errors += decode_errors;
        stats.broker_errors += broker_errors;
        drop_records(table, decode_errors, DropReason::Decode);
        drop_records(table, broker_errors, DropReason::Broker);

        if records.len() < MIN_BATCH_RECORDS {
            if carried > 0 {
                // Only the sample is here; keep it for the next batch.
                sample = records.pop();
            } else if !records.is_empty() {
                debug!(table, records = records.len(), "Not enough records in this poll, discarding");
                stats.below_low_water += records.len() as u64;
                drop_records(table, records.len() as u64, DropReason::BelowLowWater);
            }
            continue;
        }

        info!(table, rows = records.len(), "Inserting batch");
        write(consumer, session, table, &records, &mut stats).await;
    }

    stats
}

/// Insert and commit every record on its own until shutdown.
pub async fn run_single<E: Engine>(
    consumer: &mut dyn MessageSource,
    session: &mut EngineSession<E>,
    options: &IngestOptions,
    sample: Option<Record>,
    shutdown: &CancellationToken,
) -> IngestStats {
    let table = options.table.as_str();
    let mut stats = IngestStats::default();

    if let Some(sample) = sample {
        write(consumer, session, table, &[sample], &mut stats).await;
    }

    loop {
        let delivery = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            delivery = consumer.recv(options.poll_timeout) => delivery,
        };
        stats.polls += 1;

        match delivery {
            None => {}
            Some(Delivery::Message {
                topic,
                partition,
                offset,
                payload,
            }) => {
                stats.deliveries += 1;
                match decode(payload.as_deref()) {
                    Ok(object) => {
                        debug!(table, %topic, partition, offset, "Inserting record");
                        write(consumer, session, table, &[flatten(object)], &mut stats).await;
                    }
                    Err(e) => {
                        error!(table, %topic, partition, offset, "Dropping undecodable record: {}", e);
                        stats.decode_errors += 1;
                        drop_records(table, 1, DropReason::Decode);
                    }
                }
            }
            Some(Delivery::PartitionEof { partition }) => {
                debug!(table, partition, "Reached end of partition");
            }
            Some(Delivery::Error(e)) => {
                stats.deliveries += 1;
                warn!(table, "Dropping delivery with broker error: {}", e);
                stats.broker_errors += 1;
                drop_records(table, 1, DropReason::Broker);
            }
        }
    }

    stats
}

fn drop_records(table: &str, count: u64, reason: DropReason) {
    if count > 0 {
        emit!(RecordsDropped {
            count,
            reason,
            table: table.to_string(),
        });
    }
}
