//! Message broker abstraction.
//!
//! The pipeline needs three primitives from a broker: keyed publish to a
//! topic, opening a reader on a topic under a consumer group, and reading
//! one message at a time from that reader. [`memory::MemoryBroker`] backs
//! tests and local development; `kafka::KafkaBroker` (feature `kafka`) is
//! the production backend.

use async_trait::async_trait;
use bytes::Bytes;

#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;

/// Topic the workers consume document jobs from.
pub const JOB_REQUESTS_TOPIC: &str = "latex-compilation-requests";

/// Topic the workers publish completion events to.
pub const COMPLETION_TOPIC: &str = "latex-compilation-results";

/// Consumer group shared by every API instance reading completions.
pub const COMPLETION_GROUP_ID: &str = "api-completion-consumers";

/// A single message read from a topic.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub topic: String,
    pub key: Option<Bytes>,
    pub payload: Bytes,
    pub partition: i32,
    pub offset: i64,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// The broker could not be reached.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// The reader was closed or its source was shut down.
    #[error("Broker reader closed")]
    Closed,

    /// Any other client-side failure.
    #[error("Broker client error: {0}")]
    Client(String),

    #[cfg(feature = "kafka")]
    #[error(transparent)]
    Kafka(#[from] rdkafka::error::KafkaError),
}

/// Keyed publish to a topic.
#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    /// Publish `payload` to `topic`. Messages with the same `key` keep
    /// their relative order.
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> Result<(), BrokerError>;
}

/// Opens readers bound to a topic and consumer group.
#[async_trait]
pub trait BrokerSubscriber: Send + Sync {
    async fn subscribe(
        &self,
        topic: &str,
        group_id: &str,
    ) -> Result<Box<dyn BrokerReader>, BrokerError>;
}

/// A blocking, one-at-a-time reader.
///
/// `read` must be cancel-safe: dropping the future before it resolves may
/// not lose a message.
#[async_trait]
pub trait BrokerReader: Send {
    async fn read(&mut self) -> Result<BrokerMessage, BrokerError>;

    async fn close(&mut self) -> Result<(), BrokerError>;
}
