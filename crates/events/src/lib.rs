//! Broker plumbing for document jobs and their completion notifications.
//!
//! - [`broker`] -- publish/subscribe abstraction with an in-memory backend
//!   and, behind the `kafka` feature, an `rdkafka` backend.
//! - [`JobProducer`] -- enqueues [`JobRequest`](meritum_core::JobRequest)s
//!   for workers.
//! - [`CompletionConsumer`] -- reads worker results and hands each one to a
//!   [`Dispatcher`] for delivery to the addressed user.
//! - [`Backoff`] -- capped exponential delay used between failed reads.

pub mod backoff;
pub mod broker;
pub mod consumer;
pub mod dispatch;
pub mod producer;

pub use backoff::Backoff;
pub use broker::memory::MemoryBroker;
pub use broker::{
    BrokerError, BrokerMessage, BrokerPublisher, BrokerReader, BrokerSubscriber,
    COMPLETION_GROUP_ID, COMPLETION_TOPIC, JOB_REQUESTS_TOPIC,
};
pub use consumer::{CompletionConsumer, ConsumerConfig, ConsumerState, ConsumerStats};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use producer::{JobProducer, ProducerError, DEFAULT_PUBLISH_TIMEOUT};
