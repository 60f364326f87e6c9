//! Kafka backend built on `rdkafka`.
//!
//! One [`FutureProducer`] is shared by every publish; each subscription
//! gets its own [`StreamConsumer`] with auto-commit enabled, so delivery is
//! at-least-once and a reconnect may replay recent completions.

use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message as _;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use super::{BrokerError, BrokerMessage, BrokerPublisher, BrokerReader, BrokerSubscriber};

/// Local queueing bound for the producer. The caller applies its own
/// publish deadline on top of this.
const MESSAGE_TIMEOUT_MS: &str = "10000";

/// Connection settings plus the shared producer.
pub struct KafkaBroker {
    bootstrap_servers: String,
    producer: FutureProducer,
}

impl KafkaBroker {
    /// Create the producer for `bootstrap_servers` (comma-separated
    /// `host:port` list). No network traffic happens until first use.
    pub fn connect(bootstrap_servers: &str) -> Result<Self, BrokerError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("message.timeout.ms", MESSAGE_TIMEOUT_MS)
            .create()?;

        tracing::info!(bootstrap_servers, "Kafka producer initialized");

        Ok(Self {
            bootstrap_servers: bootstrap_servers.to_string(),
            producer,
        })
    }
}

#[async_trait]
impl BrokerPublisher for KafkaBroker {
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> Result<(), BrokerError> {
        let record = FutureRecord::to(topic).key(key).payload(payload.as_ref());

        self.producer
            .send(record, Timeout::Never)
            .await
            .map(|_| ())
            .map_err(|(err, _message)| BrokerError::Kafka(err))
    }
}

#[async_trait]
impl BrokerSubscriber for KafkaBroker {
    async fn subscribe(
        &self,
        topic: &str,
        group_id: &str,
    ) -> Result<Box<dyn BrokerReader>, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .create()?;

        consumer.subscribe(&[topic])?;
        tracing::info!(topic, group_id, "Kafka consumer subscribed");

        Ok(Box::new(KafkaReader {
            consumer,
            closed: false,
        }))
    }
}

struct KafkaReader {
    consumer: StreamConsumer,
    closed: bool,
}

#[async_trait]
impl BrokerReader for KafkaReader {
    async fn read(&mut self) -> Result<BrokerMessage, BrokerError> {
        if self.closed {
            return Err(BrokerError::Closed);
        }

        let message = self.consumer.recv().await?;
        Ok(BrokerMessage {
            topic: message.topic().to_string(),
            key: message.key().map(Bytes::copy_from_slice),
            payload: Bytes::copy_from_slice(message.payload().unwrap_or_default()),
            partition: message.partition(),
            offset: message.offset(),
        })
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        if !self.closed {
            self.consumer.unsubscribe();
            self.closed = true;
        }
        Ok(())
    }
}
