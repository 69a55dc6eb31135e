use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::events::{ChatEvent, FeedEvent, Platform};
use super::state::ConnectionState;

/// Maximum number of events buffered between the network tasks and the consumer
const CHANNEL_CAPACITY: usize = 1024;

/// Sending side handed to each platform connection.
///
/// Every connection sends from its own task, so events from one platform
/// arrive at the consumer in the order they were sent. Interleaving between
/// platforms follows arrival timing only.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    tx: mpsc::Sender<FeedEvent>,
}

/// Receiving side, owned by the single consumer
#[derive(Debug)]
pub struct FeedReceiver {
    rx: mpsc::Receiver<FeedEvent>,
}

impl EventDispatcher {
    /// Create a dispatcher and the receiver the consumer drains
    pub fn new() -> (Self, FeedReceiver) {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, FeedReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, FeedReceiver { rx })
    }

    /// Dispatch a chat message. Messages with an empty username or text are dropped.
    pub async fn chat(&self, event: ChatEvent) -> bool {
        if !event.is_displayable() {
            log::trace!("Dropping {} event without username or text", event.platform);
            return false;
        }
        self.send(FeedEvent::Chat(event)).await
    }

    /// Dispatch a system-level notification
    pub async fn system(&self, platform: Platform, message: impl Into<String>) -> bool {
        let message = message.into();
        log::info!("[{}] {}", platform, message);
        self.send(FeedEvent::System { platform, message }).await
    }

    /// Dispatch a connection state transition
    pub async fn state(&self, platform: Platform, state: ConnectionState) -> bool {
        log::debug!("[{}] state -> {:?}", platform, state);
        self.send(FeedEvent::State { platform, state }).await
    }

    /// Like `system`, but never waits for queue space
    pub fn try_system(&self, platform: Platform, message: impl Into<String>) -> bool {
        let message = message.into();
        log::info!("[{}] {}", platform, message);
        self.try_send(FeedEvent::System { platform, message })
    }

    /// Like `state`, but never waits for queue space
    pub fn try_state(&self, platform: Platform, state: ConnectionState) -> bool {
        log::debug!("[{}] state -> {:?}", platform, state);
        self.try_send(FeedEvent::State { platform, state })
    }

    fn try_send(&self, event: FeedEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(_) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                log::warn!("Feed queue is full, dropping {:?}", event);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::debug!("Feed consumer is gone, event discarded");
                false
            }
        }
    }

    async fn send(&self, event: FeedEvent) -> bool {
        match self.tx.send(event).await {
            Ok(_) => true,
            Err(_) => {
                log::debug!("Feed consumer is gone, event discarded");
                false
            }
        }
    }
}

impl FeedReceiver {
    /// Wait for the next event; `None` once every dispatcher has been dropped
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.rx.recv().await
    }

    /// Take everything currently queued without waiting
    pub fn drain(&mut self) -> Vec<FeedEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Consume the receiver as a `Stream`
    pub fn into_stream(self) -> ReceiverStream<FeedEvent> {
        ReceiverStream::new(self.rx)
    }
}
