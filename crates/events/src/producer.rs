//! Enqueues document jobs for the rendering workers.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use meritum_core::{CoreError, JobRequest};

use crate::broker::{BrokerError, BrokerPublisher, JOB_REQUESTS_TOPIC};

/// Upper bound on a single publish, including broker round-trips.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("Failed to encode job request: {0}")]
    Encode(#[from] CoreError),

    #[error("Failed to write to broker: {0}")]
    Broker(#[from] BrokerError),

    #[error("Broker publish timed out after {0:?}")]
    Timeout(Duration),
}

/// Publishes [`JobRequest`]s to the job-requests topic.
///
/// There is no retry here. Job ids are stable, so a caller that sees an
/// error may simply submit the same request again.
#[derive(Clone)]
pub struct JobProducer {
    publisher: Arc<dyn BrokerPublisher>,
    topic: String,
    publish_timeout: Duration,
}

impl JobProducer {
    /// Producer for the default topic and timeout.
    pub fn new(publisher: Arc<dyn BrokerPublisher>) -> Self {
        Self {
            publisher,
            topic: JOB_REQUESTS_TOPIC.to_string(),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Serialize `request` and publish it keyed by its job id.
    pub async fn enqueue(&self, request: &JobRequest) -> Result<(), ProducerError> {
        let payload = Bytes::from(request.to_payload()?);
        let key = request.partition_key();

        let publish = self.publisher.publish(&self.topic, &key, payload);
        let result = match tokio::time::timeout(self.publish_timeout, publish).await {
            Ok(result) => result.map_err(ProducerError::from),
            Err(_) => Err(ProducerError::Timeout(self.publish_timeout)),
        };

        match &result {
            Ok(()) => tracing::info!(
                job_id = request.job_id,
                user_id = %request.user_id,
                doc_type = %request.doc_type,
                topic = %self.topic,
                "Queued document job",
            ),
            Err(e) => tracing::error!(
                job_id = request.job_id,
                user_id = %request.user_id,
                error = %e,
                "Error writing document job to broker",
            ),
        }

        result
    }
}
