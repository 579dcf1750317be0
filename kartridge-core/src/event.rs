//! Vendor event tags → owned `Event` values with JSON serialization.

use serde::Serialize;

/// Message delivered for the ready event, whatever the vendor payload says.
pub const READY_MESSAGE: &str = "Kongregate API is READY";
/// Message delivered for the connected event.
pub const CONNECTED_MESSAGE: &str = "Kongregate API is CONNECTED";
/// Prefix of the message delivered for the user event; the current username follows.
pub const USER_MESSAGE_PREFIX: &str = "Kongregate API user info change, username=";
/// Username the vendor reports for guest users.
pub const GUEST_USERNAME: &str = "Guest";

/// The fixed vocabulary of vendor notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The API finished initializing and reached the Kartridge app once.
    Ready,
    /// User information became available or changed.
    User,
    /// The game auth token was received or changed.
    AuthToken,
    Connected,
    Disconnected,
    Shutdown,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Ready,
        EventKind::User,
        EventKind::AuthToken,
        EventKind::Connected,
        EventKind::Disconnected,
        EventKind::Shutdown,
    ];

    /// Name used on the wire to the host (`type` field).
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Ready => "ready",
            EventKind::User => "user",
            EventKind::AuthToken => "auth_token",
            EventKind::Connected => "connected",
            EventKind::Disconnected => "disconnected",
            EventKind::Shutdown => "shutdown",
        }
    }
}

/// The tag strings a vendor implementation uses for each [`EventKind`].
///
/// The real library exports these as `KONGREGATE_EVENT_*` constants and the
/// loader reads them at open time. In-process implementations use the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTags {
    pub ready: String,
    pub user: String,
    pub auth_token: String,
    pub connected: String,
    pub disconnected: String,
    pub shutdown: String,
}

impl Default for EventTags {
    fn default() -> Self {
        Self {
            ready: EventKind::Ready.as_str().to_string(),
            user: EventKind::User.as_str().to_string(),
            auth_token: EventKind::AuthToken.as_str().to_string(),
            connected: EventKind::Connected.as_str().to_string(),
            disconnected: EventKind::Disconnected.as_str().to_string(),
            shutdown: EventKind::Shutdown.as_str().to_string(),
        }
    }
}

impl EventTags {
    /// Tag string for a kind.
    pub fn tag(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::Ready => &self.ready,
            EventKind::User => &self.user,
            EventKind::AuthToken => &self.auth_token,
            EventKind::Connected => &self.connected,
            EventKind::Disconnected => &self.disconnected,
            EventKind::Shutdown => &self.shutdown,
        }
    }

    /// Classify a raw vendor tag. `None` for tags outside the vocabulary.
    pub fn classify(&self, tag: &str) -> Option<EventKind> {
        EventKind::ALL.into_iter().find(|&kind| self.tag(kind) == tag)
    }
}

/// One notification, copied out of the vendor's buffers.
///
/// Serialized as `{"type": ..., "data": ...}`. `payload` keeps the vendor's raw
/// string (a JSON object for user and auth token events) and stays Rust-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: String,
    #[serde(skip)]
    pub payload: String,
}

impl Event {
    /// Build the event handed to the caller for a vendor notification.
    ///
    /// `username` must be the vendor's username at the moment of the callback;
    /// it is only read for [`EventKind::User`].
    pub fn from_vendor(kind: EventKind, payload: String, username: &str) -> Self {
        let data = match kind {
            EventKind::Ready => READY_MESSAGE.to_string(),
            EventKind::Connected => CONNECTED_MESSAGE.to_string(),
            EventKind::User => format!("{USER_MESSAGE_PREFIX}{username}"),
            EventKind::AuthToken | EventKind::Disconnected | EventKind::Shutdown => payload.clone(),
        };
        Self {
            kind,
            data,
            payload,
        }
    }

    /// Parse the raw payload as JSON. The bridge never does this itself.
    pub fn payload_json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.payload).ok()
    }
}
