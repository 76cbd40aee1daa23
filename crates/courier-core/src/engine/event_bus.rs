//! Event bus for the engine's notification feed.
//!
//! Wraps a tokio broadcast channel. Publishing is best-effort: a send
//! failure (no subscribers, lagging receivers) never affects the state
//! transition that produced the event.

use courier_types::EventRecord;
use tokio::sync::broadcast;

/// Broadcast feed of lifecycle and assignment events.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<EventRecord>,
}

impl EventBus {
	/// Creates a new event bus with the given channel capacity.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Publishes an event to all current subscribers.
	///
	/// Returns the number of subscribers that received the event; an
	/// error means there were none, which callers may ignore.
	pub fn publish(&self, event: EventRecord) -> Result<usize, Box<EventRecord>> {
		self.sender
			.send(event)
			.map_err(|broadcast::error::SendError(event)| Box::new(event))
	}

	/// Creates a new subscription to the feed.
	///
	/// Subscribers only see events published after they subscribe.
	pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
		self.sender.subscribe()
	}

	/// Returns the number of active subscribers.
	pub fn subscriber_count(&self) -> usize {
		self.sender.receiver_count()
	}
}
