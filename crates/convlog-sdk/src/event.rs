//! Conversation events delivered to subscribers.

use std::sync::RwLock;

use tokio::sync::broadcast;

use convlog_types::{ErrorKind, ObjectId};

/// Something a subscriber may want to react to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConversationEvent {
    /// A validation, merge, fetch or authorization failure.
    Error {
        conversation: String,
        kind: ErrorKind,
        detail: String,
    },
    /// The local head moved.
    HeadMoved {
        conversation: String,
        head: ObjectId,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Error,
    HeadMoved,
}

impl ConversationEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Error { .. } => EventKind::Error,
            Self::HeadMoved { .. } => EventKind::HeadMoved,
        }
    }

    pub fn conversation(&self) -> &str {
        match self {
            Self::Error { conversation, .. } | Self::HeadMoved { conversation, .. } => conversation,
        }
    }
}

/// Receiver end of a subscription.
pub type EventStream = broadcast::Receiver<ConversationEvent>;

struct Subscriber {
    kinds: Option<Vec<EventKind>>,
    sender: broadcast::Sender<ConversationEvent>,
}

/// Fan-out of conversation events to subscribers.
pub struct EventBus {
    capacity: usize,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Every event.
    pub fn subscribe(&self) -> EventStream {
        self.register(None)
    }

    /// Only events of the given kinds.
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> EventStream {
        self.register(Some(kinds.to_vec()))
    }

    fn register(&self, kinds: Option<Vec<EventKind>>) -> EventStream {
        let (sender, rx) = broadcast::channel(self.capacity);
        self.subscribers
            .write()
            .expect("lock poisoned")
            .push(Subscriber { kinds, sender });
        rx
    }

    /// Deliver `event`; subscribers that dropped their receiver are pruned.
    pub fn emit(&self, event: ConversationEvent) {
        let kind = event.kind();
        let mut subs = self.subscribers.write().expect("lock poisoned");
        subs.retain(|sub| {
            let wanted = sub.kinds.as_ref().map_or(true, |kinds| kinds.contains(&kind));
            if wanted {
                sub.sender.send(event.clone()).is_ok()
            } else {
                sub.sender.receiver_count() > 0
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().expect("lock poisoned").len()
    }
}
