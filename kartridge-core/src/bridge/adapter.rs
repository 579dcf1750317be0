//! EventBridge: turns raw vendor notifications into `Event`s for the handler.

use crate::event::{Event, EventKind, EventTags};
use crate::session::Snapshot;
use crate::vendor::KongregateApi;

/// The registered handler. Receives each event together with the session
/// state as it stands at that moment. Owned by the bridge while registered.
pub type EventHandler = Box<dyn FnMut(Event, &Snapshot) + Send>;

/// Holds the handler and the vendor's tag vocabulary.
pub struct EventBridge {
    tags: EventTags,
    handler: Option<EventHandler>,
    delivered: u64,
}

impl EventBridge {
    pub fn new(tags: EventTags) -> Self {
        Self {
            tags,
            handler: None,
            delivered: 0,
        }
    }

    /// Replace the handler. The previous one is dropped and sees nothing further.
    pub fn set_handler(&mut self, handler: EventHandler) {
        if self.handler.replace(handler).is_some() {
            tracing::debug!("event handler replaced");
        }
    }

    pub fn clear_handler(&mut self) {
        self.handler = None;
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Events handed to a handler so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Handle one vendor callback, on the vendor's call stack.
    ///
    /// `snapshot` is brought up to date for the event before the handler runs,
    /// so a user event carries the username the vendor reports right now.
    pub(crate) fn forward<A: KongregateApi + ?Sized>(
        &mut self,
        api: &A,
        snapshot: &mut Snapshot,
        tag: &str,
        payload: &str,
    ) {
        let Some(kind) = self.tags.classify(tag) else {
            tracing::warn!(%tag, "unknown vendor event, dropping");
            return;
        };

        match kind {
            EventKind::Ready => snapshot.ready = true,
            EventKind::Connected => snapshot.connected = true,
            EventKind::Disconnected => snapshot.connected = false,
            EventKind::User => {
                snapshot.username = api.username();
                snapshot.user_id = api.user_id();
            }
            EventKind::AuthToken => snapshot.auth_token = api.game_auth_token(),
            EventKind::Shutdown => {}
        }

        let event = Event::from_vendor(kind, payload.to_string(), &snapshot.username);
        tracing::debug!(kind = kind.as_str(), data = %event.data, "vendor event");

        if let Some(handler) = self.handler.as_mut() {
            self.delivered += 1;
            handler(event, &*snapshot);
        }
    }
}
