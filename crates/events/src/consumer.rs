//! Completion-event consumer.
//!
//! [`CompletionConsumer`] reads worker results from the completion topic and
//! hands each raw payload to a [`Dispatcher`]. The loop is best-effort: a
//! read error is retried after a backoff, a malformed payload is logged and
//! skipped, and an event for a user without a live connection is dropped.
//! Only cancellation (or the reader closing) ends it.

use std::sync::Arc;
use std::time::Duration;

use meritum_core::CompletionEvent;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::backoff::{Backoff, DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF};
use crate::broker::{
    BrokerError, BrokerMessage, BrokerReader, BrokerSubscriber, COMPLETION_GROUP_ID,
    COMPLETION_TOPIC,
};
use crate::dispatch::{DispatchOutcome, Dispatcher};

/// Topic, group and retry settings for the consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub topic: String,
    pub group_id: String,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            topic: COMPLETION_TOPIC.to_string(),
            group_id: COMPLETION_GROUP_ID.to_string(),
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

/// Lifecycle of the consumer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerState {
    Starting,
    Reading,
    Stopped,
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    /// Messages read off the broker.
    pub received: u64,
    /// Events queued on at least one connection.
    pub delivered: u64,
    /// Well-formed events that reached nobody.
    pub dropped: u64,
    /// Payloads that did not parse as a completion event.
    pub malformed: u64,
    /// Failed broker reads.
    pub read_errors: u64,
}

pub struct CompletionConsumer {
    reader: Box<dyn BrokerReader>,
    dispatcher: Arc<dyn Dispatcher>,
    backoff: Backoff,
    stats: ConsumerStats,
    state: watch::Sender<ConsumerState>,
}

impl CompletionConsumer {
    /// Open a reader on the configured topic and group.
    pub async fn start(
        subscriber: &dyn BrokerSubscriber,
        config: &ConsumerConfig,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self, BrokerError> {
        tracing::info!(
            topic = %config.topic,
            group_id = %config.group_id,
            "Starting completion consumer",
        );
        let reader = subscriber.subscribe(&config.topic, &config.group_id).await?;
        Ok(Self::from_reader(reader, dispatcher, config))
    }

    /// Build a consumer around an already opened reader.
    pub fn from_reader(
        reader: Box<dyn BrokerReader>,
        dispatcher: Arc<dyn Dispatcher>,
        config: &ConsumerConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Starting);
        Self {
            reader,
            dispatcher,
            backoff: Backoff::new(config.initial_backoff, config.max_backoff),
            stats: ConsumerStats::default(),
            state,
        }
    }

    /// Observe state transitions (used by the health endpoint).
    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    /// Run until `cancel` fires or the reader closes, then close the reader.
    pub async fn run(mut self, cancel: CancellationToken) -> ConsumerStats {
        self.state.send_replace(ConsumerState::Reading);

        loop {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!("Completion consumer cancelled, shutting down");
                    break;
                }
                result = self.reader.read() => result,
            };

            match result {
                Ok(message) => {
                    self.backoff.reset();
                    self.handle(message).await;
                }
                Err(BrokerError::Closed) => {
                    tracing::info!("Completion reader closed, shutting down");
                    break;
                }
                Err(e) => {
                    self.stats.read_errors += 1;
                    let delay = self.backoff.next_delay();
                    tracing::error!(
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Completion consumer read failed, retrying",
                    );
                    tokio::select! {
                        () = cancel.cancelled() => {
                            tracing::info!("Completion consumer cancelled during backoff");
                            break;
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        if let Err(e) = self.reader.close().await {
            tracing::warn!(error = %e, "Failed to close completion reader");
        }
        self.state.send_replace(ConsumerState::Stopped);

        let stats = self.stats;
        tracing::info!(
            received = stats.received,
            delivered = stats.delivered,
            dropped = stats.dropped,
            malformed = stats.malformed,
            read_errors = stats.read_errors,
            "Completion consumer stopped",
        );
        stats
    }

    async fn handle(&mut self, message: BrokerMessage) {
        self.stats.received += 1;

        let event = match CompletionEvent::from_slice(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                self.stats.malformed += 1;
                tracing::error!(
                    error = %e,
                    partition = message.partition,
                    offset = message.offset,
                    "Failed to decode completion event, discarding",
                );
                return;
            }
        };

        tracing::info!(
            user_id = %event.user_id,
            job_id = event.job_id,
            success = event.success,
            "Received completion event",
        );

        let outcome = self
            .dispatcher
            .dispatch(&event.user_id, message.payload)
            .await;

        if outcome.delivered() > 0 {
            self.stats.delivered += 1;
        } else {
            self.stats.dropped += 1;
        }

        match outcome {
            DispatchOutcome::Delivered { connections } => {
                tracing::debug!(
                    user_id = %event.user_id,
                    connections,
                    "Notification queued",
                );
            }
            DispatchOutcome::Evicted { delivered, evicted } => {
                tracing::warn!(
                    user_id = %event.user_id,
                    delivered,
                    evicted,
                    "Evicted connections with full outbound buffers",
                );
            }
            DispatchOutcome::NoConnection => {
                tracing::warn!(
                    user_id = %event.user_id,
                    job_id = event.job_id,
                    "No clients connected for user, dropping notification",
                );
            }
            DispatchOutcome::Unavailable => {
                tracing::warn!(
                    user_id = %event.user_id,
                    "Connection registry stopped, dropping notification",
                );
            }
        }
    }
}
