//! Transition events emitted by the checker.

use stream_platforms::StreamData;
use tokio::sync::broadcast;

/// Streams that changed live state in one cycle.
///
/// At most one event of each kind is published per cycle, and never with
/// an empty list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Streams that went live.
    Online(Vec<StreamData>),
    /// Streams confirmed offline.
    Offline(Vec<StreamData>),
}

impl StreamEvent {
    pub fn streams(&self) -> &[StreamData] {
        match self {
            StreamEvent::Online(streams) | StreamEvent::Offline(streams) => streams,
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, StreamEvent::Online(_))
    }

    /// Get a human-readable description of the event.
    pub fn description(&self) -> String {
        let names = self
            .streams()
            .iter()
            .map(|s| format!("{}:{}", s.platform, s.unique_name))
            .collect::<Vec<_>>()
            .join(", ");
        match self {
            StreamEvent::Online(_) => format!("now live: {}", names),
            StreamEvent::Offline(_) => format!("went offline: {}", names),
        }
    }
}

/// Broadcaster for stream events.
#[derive(Clone)]
pub struct StreamEventBroadcaster {
    sender: broadcast::Sender<StreamEvent>,
}

impl StreamEventBroadcaster {
    /// Create a new broadcaster with default capacity (256).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of subscribers that received it;
    /// zero subscribers is not an error.
    pub fn publish(&self, event: StreamEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for StreamEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
