//! In-process broker used by tests and by the `memory` broker backend.
//!
//! Each topic is a single unbounded queue. All readers of a topic compete
//! for its messages regardless of group id, which models one consumer
//! group per topic. Offsets are assigned per topic on publish.
//!
//! The broker can be switched "offline" to simulate an unreachable
//! cluster, and read faults can be queued to exercise consumer retry
//! paths.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::{BrokerError, BrokerMessage, BrokerPublisher, BrokerReader, BrokerSubscriber};

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<BrokerMessage>>>;

struct TopicQueue {
    sender: mpsc::UnboundedSender<BrokerMessage>,
    receiver: SharedReceiver,
    next_offset: i64,
}

impl TopicQueue {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
            next_offset: 0,
        }
    }
}

struct Inner {
    topics: Mutex<HashMap<String, TopicQueue>>,
    online: AtomicBool,
    read_faults: Mutex<VecDeque<BrokerError>>,
}

/// Cheaply cloneable handle to a shared in-memory broker.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: Mutex::new(HashMap::new()),
                online: AtomicBool::new(true),
                read_faults: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Toggle reachability. While offline every publish fails with
    /// [`BrokerError::Unavailable`].
    pub fn set_online(&self, online: bool) {
        self.inner.online.store(online, Ordering::SeqCst);
    }

    /// Queue an error to be returned by the next read on any topic.
    pub fn inject_read_error(&self, error: BrokerError) {
        lock(&self.inner.read_faults).push_back(error);
    }

    fn receiver_for(&self, topic: &str) -> SharedReceiver {
        let mut topics = lock(&self.inner.topics);
        let queue = topics
            .entry(topic.to_string())
            .or_insert_with(TopicQueue::new);
        Arc::clone(&queue.receiver)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Every critical section is a single insert or pop, so a poisoned guard
/// still holds consistent data.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl BrokerPublisher for MemoryBroker {
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> Result<(), BrokerError> {
        if !self.inner.online.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable(format!(
                "in-memory broker is offline (topic {topic})"
            )));
        }

        let mut topics = lock(&self.inner.topics);
        let queue = topics
            .entry(topic.to_string())
            .or_insert_with(TopicQueue::new);

        let message = BrokerMessage {
            topic: topic.to_string(),
            key: Some(Bytes::copy_from_slice(key.as_bytes())),
            payload,
            partition: 0,
            offset: queue.next_offset,
        };
        queue.next_offset += 1;

        // The queue owns its receiver, so the channel cannot be closed here.
        queue
            .sender
            .send(message)
            .map_err(|_| BrokerError::Closed)
    }
}

#[async_trait]
impl BrokerSubscriber for MemoryBroker {
    async fn subscribe(
        &self,
        topic: &str,
        group_id: &str,
    ) -> Result<Box<dyn BrokerReader>, BrokerError> {
        tracing::debug!(topic, group_id, "Opening in-memory broker reader");
        Ok(Box::new(MemoryReader {
            broker: self.clone(),
            receiver: self.receiver_for(topic),
            closed: false,
        }))
    }
}

/// Reader over one in-memory topic.
pub struct MemoryReader {
    broker: MemoryBroker,
    receiver: SharedReceiver,
    closed: bool,
}

#[async_trait]
impl BrokerReader for MemoryReader {
    async fn read(&mut self) -> Result<BrokerMessage, BrokerError> {
        if self.closed {
            return Err(BrokerError::Closed);
        }
        if let Some(fault) = lock(&self.broker.inner.read_faults).pop_front() {
            return Err(fault);
        }

        let mut receiver = self.receiver.lock().await;
        receiver.recv().await.ok_or(BrokerError::Closed)
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn published_messages_arrive_in_order_with_keys() {
        let broker = MemoryBroker::new();
        let mut reader = broker.subscribe("jobs", "g").await.unwrap();

        broker.publish("jobs", "1", Bytes::from_static(b"a")).await.unwrap();
        broker.publish("jobs", "2", Bytes::from_static(b"b")).await.unwrap();

        let first = reader.read().await.unwrap();
        let second = reader.read().await.unwrap();

        assert_eq!(first.payload.as_ref(), b"a");
        assert_eq!(first.key.as_deref(), Some(b"1".as_slice()));
        assert_eq!(first.offset, 0);
        assert_eq!(second.payload.as_ref(), b"b");
        assert_eq!(second.offset, 1);
    }

    #[tokio::test]
    async fn messages_published_before_subscribe_are_kept() {
        let broker = MemoryBroker::new();
        broker.publish("jobs", "9", Bytes::from_static(b"early")).await.unwrap();

        let mut reader = broker.subscribe("jobs", "g").await.unwrap();
        let message = reader.read().await.unwrap();
        assert_eq!(message.payload.as_ref(), b"early");
    }

    #[tokio::test]
    async fn offline_broker_rejects_publish() {
        let broker = MemoryBroker::new();
        broker.set_online(false);

        let result = broker.publish("jobs", "1", Bytes::from_static(b"x")).await;
        assert_matches!(result, Err(BrokerError::Unavailable(_)));
    }

    #[tokio::test]
    async fn injected_fault_is_returned_once() {
        let broker = MemoryBroker::new();
        let mut reader = broker.subscribe("results", "g").await.unwrap();
        broker.inject_read_error(BrokerError::Client("boom".into()));
        broker.publish("results", "1", Bytes::from_static(b"ok")).await.unwrap();

        assert_matches!(reader.read().await, Err(BrokerError::Client(_)));
        assert_eq!(reader.read().await.unwrap().payload.as_ref(), b"ok");
    }

    #[tokio::test]
    async fn closed_reader_stops_reading() {
        let broker = MemoryBroker::new();
        let mut reader = broker.subscribe("results", "g").await.unwrap();
        reader.close().await.unwrap();

        assert_matches!(reader.read().await, Err(BrokerError::Closed));
    }
}
