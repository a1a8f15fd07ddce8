//! Kafka consumers via rdkafka.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{
    BaseConsumer, CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer,
};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::{ClientContext, Offset, TopicPartitionList};
use tracing::{debug, error, info, warn};

use super::consumer::{ConsumerFactory, Delivery, MessageSource};
use crate::config::StreamDescriptor;
use crate::error::StreamError;

const SESSION_TIMEOUT: &str = "session.timeout.ms";
const HEARTBEAT_INTERVAL: &str = "heartbeat.interval.ms";

/// Base consumer settings, sized for large batches rather than low latency.
const CONSUMER_DEFAULTS: &[(&str, &str)] = &[
    ("enable.auto.commit", "false"),
    ("auto.offset.reset", "earliest"),
    ("enable.partition.eof", "false"),
    ("max.poll.interval.ms", "600000"),
    (SESSION_TIMEOUT, "180000"),
];

/// Heartbeats per session timeout. librdkafka requires the heartbeat
/// interval to be below the session timeout.
const HEARTBEATS_PER_SESSION: u64 = 3;

/// Consumer context that rewinds newly assigned partitions.
pub struct RewindContext {
    rewind: bool,
}

impl ClientContext for RewindContext {}

impl ConsumerContext for RewindContext {
    fn post_rebalance(&self, base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(assignment) if self.rewind => {
                let mut rewound = TopicPartitionList::new();
                for element in assignment.elements() {
                    if let Err(e) = rewound.add_partition_offset(
                        element.topic(),
                        element.partition(),
                        Offset::Beginning,
                    ) {
                        error!(topic = element.topic(), partition = element.partition(), "Failed to rewind partition: {}", e);
                    }
                }

                match base_consumer.assign(&rewound) {
                    Ok(()) => info!(partitions = rewound.count(), "Partitions assigned, rewound to the beginning"),
                    Err(e) => error!("Failed to rewind assigned partitions: {}", e),
                }
            }
            Rebalance::Assign(assignment) => {
                info!(partitions = assignment.count(), "Partitions assigned");
            }
            Rebalance::Revoke(revoked) => {
                info!(partitions = revoked.count(), "Partitions revoked");
            }
            Rebalance::Error(e) => warn!("Rebalance error: {}", e),
        }
    }
}

/// Opens [`KafkaSource`]s against one broker.
pub struct KafkaConsumerFactory {
    stream: StreamDescriptor,
}

impl KafkaConsumerFactory {
    pub fn new(stream: &StreamDescriptor) -> Self {
        Self {
            stream: stream.clone(),
        }
    }

    fn client_config(&self, group: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.stream.broker_url())
            .set("group.id", group);
        for (key, value) in CONSUMER_DEFAULTS {
            config.set(*key, *value);
        }
        for (key, value) in &self.stream.properties {
            config.set(key, value);
        }

        if config.get(HEARTBEAT_INTERVAL).is_none() {
            let session = config
                .get(SESSION_TIMEOUT)
                .and_then(|ms| ms.trim().parse::<u64>().ok());
            if let Some(session) = session {
                let heartbeat = (session / HEARTBEATS_PER_SESSION).max(1);
                config.set(HEARTBEAT_INTERVAL, heartbeat.to_string());
            }
        }
        config
    }
}

impl ConsumerFactory for KafkaConsumerFactory {
    fn open(&self, group: &str, topics: &[String]) -> Result<Box<dyn MessageSource>, StreamError> {
        let context = RewindContext {
            rewind: self.stream.rewind_on_assign,
        };
        let consumer: StreamConsumer<RewindContext> = self
            .client_config(group)
            .create_with_context(context)
            .map_err(|e| StreamError::CreateConsumer {
                group: group.to_string(),
                source: Box::new(e),
            })?;

        let names: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&names)
            .map_err(|e| StreamError::Subscribe {
                topics: topics.to_vec(),
                source: Box::new(e),
            })?;

        info!(
            broker = %self.stream.broker_url(),
            group,
            ?topics,
            rewind = self.stream.rewind_on_assign,
            "Subscribed to topics"
        );

        Ok(Box::new(KafkaSource { consumer }))
    }
}

/// A subscribed Kafka consumer.
pub struct KafkaSource {
    consumer: StreamConsumer<RewindContext>,
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn recv(&mut self, timeout: Duration) -> Option<Delivery> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Ok(Ok(message)) => {
                debug!(topic = message.topic(), partition = message.partition(), offset = message.offset(), "Received message");
                Some(Delivery::Message {
                    topic: message.topic().to_string(),
                    partition: message.partition(),
                    offset: message.offset(),
                    payload: message.payload().map(<[u8]>::to_vec),
                })
            }
            Ok(Err(KafkaError::PartitionEOF(partition))) => Some(Delivery::PartitionEof { partition }),
            Ok(Err(e)) => Some(Delivery::Error(e.to_string())),
            Err(_) => None,
        }
    }

    async fn commit(&mut self) -> Result<(), StreamError> {
        match self.consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(()) => Ok(()),
            // Nothing consumed since the last commit.
            Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => Ok(()),
            Err(e) => Err(StreamError::Commit {
                source: Box::new(e),
            }),
        }
    }

    async fn close(&mut self) {
        self.consumer.unsubscribe();
    }
}
