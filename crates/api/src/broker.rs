//! Chooses the broker backend named in [`BrokerConfig`].

use std::sync::Arc;

use meritum_events::{BrokerError, BrokerPublisher, BrokerSubscriber, MemoryBroker};

use crate::config::{BrokerBackend, BrokerConfig};

/// Publish and subscribe halves of one broker connection.
#[derive(Clone)]
pub struct BrokerHandles {
    pub publisher: Arc<dyn BrokerPublisher>,
    pub subscriber: Arc<dyn BrokerSubscriber>,
}

impl BrokerHandles {
    pub fn memory(broker: MemoryBroker) -> Self {
        Self {
            publisher: Arc::new(broker.clone()),
            subscriber: Arc::new(broker),
        }
    }
}

pub fn connect(config: &BrokerConfig) -> Result<BrokerHandles, BrokerError> {
    match config.backend {
        BrokerBackend::Memory => {
            tracing::warn!("Using in-memory broker; jobs stay inside this process");
            Ok(BrokerHandles::memory(MemoryBroker::new()))
        }
        #[cfg(feature = "kafka")]
        BrokerBackend::Kafka => {
            let broker = Arc::new(meritum_events::broker::kafka::KafkaBroker::connect(
                &config.kafka_brokers,
            )?);
            tracing::info!(brokers = %config.kafka_brokers, "Connected to Kafka");
            Ok(BrokerHandles {
                publisher: broker.clone(),
                subscriber: broker,
            })
        }
        #[cfg(not(feature = "kafka"))]
        BrokerBackend::Kafka => Err(BrokerError::Client(
            "BROKER=kafka requires building with the `kafka` feature".into(),
        )),
    }
}
