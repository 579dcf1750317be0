//! Session: the lifecycle controller around one Kartridge SDK instance.
//!
//! The SDK is not thread safe and only delivers events while it is being
//! polled. `Session` takes `&mut self` for every call that can reach vendor
//! state, owns the event handler, and caches what the vendor reported so
//! queries never call into the SDK:
//!
//! ```text
//! Uninitialized ──restart check true──▶ RestartPending   (exit the process)
//!       │
//!   initialize ──false──▶ Offline (vendor stubbed)
//!       │ true
//!       ▼
//!  Disconnected ⇄ Connected ──ready──▶ Ready ── shutdown ──▶ Shutdown
//! ```
//!
//! Once ready, a session stays ready until shutdown even if the connection
//! to the Kartridge app drops.

use std::ffi::CString;

use serde::Serialize;

use crate::bridge::dispatch;
use crate::bridge::{vendor_event_listener, EventBridge};
use crate::config::check_local_game_id_file;
use crate::event::Event;
use crate::vendor::KongregateApi;

/// Observable state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    /// Kartridge is relaunching the game; this process must exit.
    RestartPending,
    /// `initialize` returned false. Calls are safe and return defaults.
    Offline,
    Disconnected,
    Connected,
    Ready,
    Shutdown,
}

impl SessionState {
    /// State of an initialized session with the given snapshot.
    pub fn active(snapshot: &Snapshot) -> Self {
        if snapshot.ready {
            SessionState::Ready
        } else if snapshot.connected {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninitialized,
    RestartPending,
    Active,
    Offline,
    Shutdown,
}

/// What the vendor reported as of the last poll. All strings are owned copies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub connected: bool,
    pub ready: bool,
    pub user_id: u32,
    pub username: String,
    pub auth_token: String,
}

pub struct Session<A: KongregateApi> {
    api: A,
    bridge: EventBridge,
    lifecycle: Lifecycle,
    snapshot: Snapshot,
}

impl<A: KongregateApi> Session<A> {
    pub fn new(api: A) -> Self {
        let bridge = EventBridge::new(api.event_tags());
        Self {
            api,
            bridge,
            lifecycle: Lifecycle::Uninitialized,
            snapshot: Snapshot::default(),
        }
    }

    /// The wrapped vendor implementation.
    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn state(&self) -> SessionState {
        match self.lifecycle {
            Lifecycle::Uninitialized => SessionState::Uninitialized,
            Lifecycle::RestartPending => SessionState::RestartPending,
            Lifecycle::Offline => SessionState::Offline,
            Lifecycle::Shutdown => SessionState::Shutdown,
            Lifecycle::Active => SessionState::active(&self.snapshot),
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Register the handler that receives every event during [`Session::update`].
    /// Replaces (and drops) any previous handler.
    pub fn set_event_handler(&mut self, mut handler: impl FnMut(Event) + Send + 'static) {
        self.bridge.set_handler(Box::new(move |event: Event, _: &Snapshot| handler(event)));
    }

    /// Like [`Session::set_event_handler`], but the handler also sees the
    /// session snapshot as of the event, since the session itself is
    /// borrowed while events are delivered.
    pub fn set_event_observer(&mut self, handler: impl FnMut(Event, &Snapshot) + Send + 'static) {
        self.bridge.set_handler(Box::new(handler));
    }

    pub fn clear_event_handler(&mut self) {
        self.bridge.clear_handler();
    }

    pub fn has_event_handler(&self) -> bool {
        self.bridge.has_handler()
    }

    /// Ask Kartridge to relaunch the game if it wasn't started from it.
    ///
    /// Must run before [`Session::initialize`]. When it returns `true` the
    /// caller must exit; this session will refuse to initialize.
    pub fn restart_with_kartridge_if_needed(&mut self, game_id: u32) -> bool {
        match self.lifecycle {
            Lifecycle::RestartPending => return true,
            Lifecycle::Active | Lifecycle::Offline => {
                tracing::warn!("restart check must run before initialize, ignoring");
                return false;
            }
            Lifecycle::Uninitialized | Lifecycle::Shutdown => {}
        }

        check_local_game_id_file();
        let restart = self.api.restart_with_kartridge_if_needed(game_id);
        if restart {
            tracing::info!(game_id, "Kartridge will relaunch the game; exit without initializing");
            self.lifecycle = Lifecycle::RestartPending;
        }
        restart
    }

    /// Register the event listener with the SDK and initialize it.
    ///
    /// `settings` is an optional JSON object passed through untouched; `None`
    /// or an empty string selects vendor defaults. `false` means the game was
    /// not launched from Kartridge (or no local game id file was found) and
    /// the session runs offline.
    pub fn initialize(&mut self, settings: Option<&str>) -> bool {
        match self.lifecycle {
            Lifecycle::RestartPending => {
                tracing::error!("initialize after a pending Kartridge restart, refusing");
                return false;
            }
            Lifecycle::Active => {
                tracing::warn!("initialize on an active session, shut down first");
                return true;
            }
            Lifecycle::Uninitialized | Lifecycle::Offline | Lifecycle::Shutdown => {}
        }

        let settings = match settings.filter(|s| !s.trim().is_empty()).map(CString::new).transpose() {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("initialize settings rejected: {e}");
                return false;
            }
        };

        check_local_game_id_file();
        self.snapshot = Snapshot::default();
        self.api.set_event_listener(vendor_event_listener);
        if self.api.initialize(settings.as_deref()) {
            self.lifecycle = Lifecycle::Active;
            self.refresh();
            tracing::info!("Kartridge API initialized");
            true
        } else {
            self.lifecycle = Lifecycle::Offline;
            tracing::warn!("Kartridge API unavailable, running offline");
            false
        }
    }

    /// Shut the SDK down. Queries return defaults until the next initialize.
    pub fn shutdown(&mut self) {
        match self.lifecycle {
            Lifecycle::Active | Lifecycle::Offline => {
                self.api.shutdown();
                self.lifecycle = Lifecycle::Shutdown;
                tracing::info!("Kartridge API shut down");
            }
            Lifecycle::Uninitialized | Lifecycle::RestartPending | Lifecycle::Shutdown => {
                tracing::debug!(state = ?self.state(), "shutdown without an initialized SDK, ignoring");
            }
        }
        self.snapshot = Snapshot::default();
    }

    /// Poll the SDK. Every event it fires reaches the handler before this
    /// returns, in vendor order, on this call stack.
    pub fn update(&mut self) {
        if self.lifecycle != Lifecycle::Active {
            tracing::trace!(state = ?self.state(), "update without an active SDK, skipping");
            return;
        }

        let api = &self.api;
        let bridge = &mut self.bridge;
        let snapshot = &mut self.snapshot;
        let mut sink = |tag: &str, payload: &str| bridge.forward(api, snapshot, tag, payload);
        dispatch::polling(&mut sink, || api.update());

        self.refresh();
    }

    pub fn is_connected(&self) -> bool {
        self.snapshot.connected
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot.ready
    }

    /// Empty until user information arrives, `"Guest"` for guests.
    pub fn username(&self) -> String {
        self.snapshot.username.clone()
    }

    /// 0 for guests and before user information arrives.
    pub fn user_id(&self) -> u32 {
        self.snapshot.user_id
    }

    /// Empty for guests or before the token is fetched.
    pub fn game_auth_token(&self) -> String {
        self.snapshot.auth_token.clone()
    }

    /// Submit a stat. Fire-and-forget: the SDK gives no acknowledgement.
    pub fn submit(&self, name: &str, value: i64) {
        if !matches!(self.lifecycle, Lifecycle::Active | Lifecycle::Offline) {
            tracing::debug!(name, value, "stat submitted before initialize, dropping");
            return;
        }
        let Ok(name) = CString::new(name) else {
            tracing::warn!(name, "stat name contains a NUL byte, dropping");
            return;
        };
        self.api.submit(&name, value);
    }

    /// Copy the vendor's current state into the snapshot.
    fn refresh(&mut self) {
        let api = &self.api;
        self.snapshot.connected = api.is_connected();
        self.snapshot.ready |= api.is_ready();
        self.snapshot.user_id = api.user_id();
        self.snapshot.username = api.username();
        self.snapshot.auth_token = api.game_auth_token();
    }
}

impl<A: KongregateApi> Drop for Session<A> {
    fn drop(&mut self) {
        if matches!(self.lifecycle, Lifecycle::Active | Lifecycle::Offline) {
            self.shutdown();
        }
    }
}
