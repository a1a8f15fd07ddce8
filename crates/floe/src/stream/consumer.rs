//! Broker consumers and their lifecycle.

use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::StreamError;

/// One item handed out by a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Message {
        topic: String,
        partition: i32,
        offset: i64,
        payload: Option<Vec<u8>>,
    },
    /// The consumer caught up with the end of a partition.
    PartitionEof { partition: i32 },
    /// The broker reported an error for this delivery.
    Error(String),
}

/// A subscribed consumer with manual offset commits.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait up to `timeout` for the next delivery.
    async fn recv(&mut self, timeout: Duration) -> Option<Delivery>;

    /// Collect up to `max` deliveries within `timeout`.
    ///
    /// Returns early once a poll comes back empty.
    async fn recv_batch(&mut self, max: usize, timeout: Duration) -> Vec<Delivery> {
        let deadline = Instant::now() + timeout;
        let mut deliveries = Vec::new();

        while deliveries.len() < max {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.recv(remaining).await {
                Some(delivery) => deliveries.push(delivery),
                None => break,
            }
        }

        deliveries
    }

    /// Commit the offsets of everything received so far.
    async fn commit(&mut self) -> Result<(), StreamError>;

    /// Unsubscribe and release the broker connection.
    async fn close(&mut self);
}

/// Creates subscribed consumers.
pub trait ConsumerFactory: Send + Sync {
    fn open(&self, group: &str, topics: &[String]) -> Result<Box<dyn MessageSource>, StreamError>;
}

/// The consumers open in this process, keyed by group id.
pub struct ConsumerSet {
    factory: Box<dyn ConsumerFactory>,
    consumers: IndexMap<String, Box<dyn MessageSource>>,
}

impl ConsumerSet {
    pub fn new(factory: impl ConsumerFactory + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            consumers: IndexMap::new(),
        }
    }

    /// Open a consumer for `group` subscribed to `topics`.
    pub fn open(
        &mut self,
        group: &str,
        topics: &[String],
    ) -> Result<&mut (dyn MessageSource + 'static), StreamError> {
        if self.consumers.contains_key(group) {
            return Err(StreamError::GroupAlreadyOpen {
                group: group.to_string(),
            });
        }

        let consumer = self.factory.open(group, topics)?;
        info!(group, ?topics, "Opened consumer");

        let entry = self.consumers.entry(group.to_string()).or_insert(consumer);
        Ok(entry.as_mut())
    }

    pub fn is_open(&self, group: &str) -> bool {
        self.consumers.contains_key(group)
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Close the consumer for `group`.
    ///
    /// Idempotent. Returns whether no consumer for `group` remains open.
    pub async fn close(&mut self, group: &str) -> bool {
        match self.consumers.shift_remove(group) {
            Some(mut consumer) => {
                consumer.close().await;
                info!(group, "Closed consumer");
            }
            None => debug!(group, "Consumer already closed"),
        }
        !self.consumers.contains_key(group)
    }
}
