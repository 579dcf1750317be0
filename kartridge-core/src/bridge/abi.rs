//! C ABI exports: the public surface consumed by game hosts.
//!
//! All functions are `extern "C"` and `#[no_mangle]`.
//! Handles are opaque `u64` IDs into a global `DashMap`; 0 is never a valid handle.
//! Booleans are one byte on both sides.
//!
//! Queries read a per-handle mirror of the session snapshot, so a host may
//! call them from inside its event callback. Calls that drive the session
//! (`initialize`, `update`, `submit`, ...) on a handle whose callback is
//! currently running are refused, including when callbacks of several
//! handles are nested on one thread.
//!
//! The vendor SDK is process global: at most one live handle may wrap the
//! real library at a time.

use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Serialize;

use crate::bridge::callback::{CallbackSink, HostEventCallback};
use crate::bridge::envelope::EventEnvelope;
use crate::error::{FfiResult, KartridgeError};
use crate::event::Event;
use crate::session::{Session, SessionState, Snapshot};
use crate::vendor::library::{default_library_name, KartridgeLibrary};
use crate::vendor::mock::MockKongregate;
use crate::vendor::KongregateApi;

type HostSession = Session<Box<dyn KongregateApi + Send>>;

/// Copy of the session's observable state, readable while the session is busy.
#[derive(Debug, Clone, Serialize)]
struct Mirror {
    state: SessionState,
    #[serde(flatten)]
    snapshot: Snapshot,
}

impl Mirror {
    fn of(session: &HostSession) -> Self {
        Self {
            state: session.state(),
            snapshot: session.snapshot().clone(),
        }
    }
}

struct HostHandle {
    session: Mutex<HostSession>,
    mirror: Arc<Mutex<Mirror>>,
    /// Set once the handle leaves the table; the host callback must not run after that.
    destroyed: Arc<AtomicBool>,
    // After `session`, so the SDK is shut down before the claim is released.
    _claim: Option<LibraryClaim>,
}

/// Whether a live handle wraps the vendor library.
static LIBRARY_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Exclusive use of the process-global SDK, released on drop.
struct LibraryClaim;

impl LibraryClaim {
    fn acquire() -> Option<Self> {
        LIBRARY_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LibraryClaim)
    }
}

impl Drop for LibraryClaim {
    fn drop(&mut self) {
        LIBRARY_CLAIMED.store(false, Ordering::Release);
    }
}

/// Global handle table. Maps handle IDs → Arc<HostHandle>.
static HANDLES: Lazy<DashMap<u64, Arc<HostHandle>>> = Lazy::new(DashMap::new);

/// Monotonic handle counter.
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Handles whose host callbacks are running on this thread, outermost first.
    static IN_CALLBACK: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Marks `handle`'s callback as running on this thread until dropped.
struct CallbackScope;

impl CallbackScope {
    fn enter(handle: u64) -> Self {
        IN_CALLBACK.with(|stack| stack.borrow_mut().push(handle));
        CallbackScope
    }
}

impl Drop for CallbackScope {
    fn drop(&mut self) {
        IN_CALLBACK.with(|stack| stack.borrow_mut().pop());
    }
}

fn in_callback(handle: u64) -> bool {
    IN_CALLBACK.with(|stack| stack.borrow().contains(&handle))
}

/// Helper: read a C string pointer into a Rust String, returning None on null or invalid UTF-8.
unsafe fn read_c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok().map(String::from)
}

/// Helper: hand a string to the host. Null if it contains a NUL byte.
fn into_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

fn lookup(handle: u64) -> Option<Arc<HostHandle>> {
    HANDLES.get(&handle).map(|entry| Arc::clone(entry.value()))
}

enum Access<R> {
    Done(R),
    NoHandle,
    Busy,
}

/// Run `op` on the session behind `handle`, then refresh its mirror.
fn with_session<R>(handle: u64, op: &str, f: impl FnOnce(&mut HostSession) -> R) -> Access<R> {
    let Some(entry) = lookup(handle) else {
        return Access::NoHandle;
    };
    if in_callback(handle) {
        tracing::error!("{op}: called from inside the event callback of handle {handle}, refusing");
        return Access::Busy;
    }
    let mut session = entry.session.lock();
    let result = f(&mut session);
    *entry.mirror.lock() = Mirror::of(&session);
    Access::Done(result)
}

fn read_mirror<R>(handle: u64, f: impl FnOnce(&Mirror) -> R) -> Option<R> {
    let entry = lookup(handle)?;
    let mirror = entry.mirror.lock();
    Some(f(&mirror))
}

fn register(api: Box<dyn KongregateApi + Send>, claim: Option<LibraryClaim>) -> u64 {
    let session = Session::new(api);
    let mirror = Arc::new(Mutex::new(Mirror::of(&session)));
    let id = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
    HANDLES.insert(
        id,
        Arc::new(HostHandle {
            session: Mutex::new(session),
            mirror,
            destroyed: Arc::new(AtomicBool::new(false)),
            _claim: claim,
        }),
    );
    id
}

// ─── Create / Destroy ────────────────────────────────────────────────

/// Open the Kartridge SDK and create a session handle for it.
///
/// # Safety
///
/// `library_path` must be a valid, NUL-terminated UTF-8 C string, or null to
/// load the SDK by its platform default name.
///
/// Returns a non-zero handle on success, or 0 if the library can't be loaded
/// or another live handle already wraps it. Destroy that handle first.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn kartridge_create(library_path: *const c_char) -> u64 {
    let path: std::path::PathBuf = match unsafe { read_c_str(library_path) } {
        Some(p) => p.into(),
        None => std::path::PathBuf::from(default_library_name()),
    };
    match KartridgeLibrary::open(&path) {
        Ok(library) => {
            let Some(claim) = LibraryClaim::acquire() else {
                tracing::error!("kartridge_create: the Kartridge SDK is already open on another handle");
                return 0;
            };
            let id = register(Box::new(library), Some(claim));
            tracing::debug!("kartridge_create: created handle {id} for {}", path.display());
            id
        }
        Err(e) => {
            tracing::error!("kartridge_create: {e}");
            0
        }
    }
}

/// Create a session handle backed by the in-process stand-in SDK.
///
/// The stand-in never fires events; `initialize_result` decides whether its
/// initialize succeeds. Useful for running a host without Kartridge installed.
#[unsafe(no_mangle)]
pub extern "C" fn kartridge_create_mock(initialize_result: bool) -> u64 {
    let id = register(
        Box::new(MockKongregate::new().with_initialize_result(initialize_result)),
        None,
    );
    tracing::debug!("kartridge_create_mock: created handle {id}");
    id
}

/// Destroy a handle, shutting the SDK down if it is still initialized.
///
/// Safe to call multiple times; unknown handles are ignored. The host callback
/// is never invoked for this handle after this returns. If called from inside
/// the handle's own event callback, the remaining events of that `update` are
/// dropped and the SDK shuts down once `update` returns.
#[unsafe(no_mangle)]
pub extern "C" fn kartridge_destroy(handle: u64) {
    if let Some((_, entry)) = HANDLES.remove(&handle) {
        entry.destroyed.store(true, Ordering::Release);
        tracing::debug!("kartridge_destroy: destroyed handle {handle}");
    }
}

// ─── Events ──────────────────────────────────────────────────────────

/// Register the event callback for a handle, replacing any previous one.
/// A null `cb` clears it.
///
/// The callback runs only inside `kartridge_update`, on the calling thread,
/// once per event, with a JSON envelope:
/// ```json
/// {"version":1,"seq":3,"timestamp_ms":1700000000000,
///  "event":{"type":"user","data":"Kongregate API user info change, username=Guest"}}
/// ```
///
/// `type` is one of `ready`, `user`, `auth_token`, `connected`,
/// `disconnected` or `shutdown`. It names the event kind, not the SDK's
/// `KONGREGATE_EVENT_*` tag string; events with tags outside that set are
/// never delivered.
///
/// # Safety
///
/// `cb` must be null or a valid function pointer. `user_data` must remain valid
/// until the callback is replaced, cleared, or the handle destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn kartridge_set_event_handler(
    handle: u64,
    cb: Option<HostEventCallback>,
    user_data: *mut c_void,
) -> i32 {
    let Some(entry) = lookup(handle) else {
        return FfiResult::InvalidHandle as i32;
    };
    let mirror = Arc::clone(&entry.mirror);
    let destroyed = Arc::clone(&entry.destroyed);
    drop(entry);

    let access = with_session(handle, "kartridge_set_event_handler", |session| match cb {
        Some(cb) => {
            let sink = CallbackSink::new(cb, user_data);
            let mut seq: u64 = 0;
            session.set_event_observer(move |event: Event, snapshot: &Snapshot| {
                if destroyed.load(Ordering::Acquire) {
                    tracing::debug!(kind = event.kind.as_str(), "handle {handle} destroyed, dropping event");
                    return;
                }
                *mirror.lock() = Mirror {
                    state: SessionState::active(snapshot),
                    snapshot: snapshot.clone(),
                };
                seq += 1;
                let envelope = EventEnvelope::new(seq, event);
                match serde_json::to_string(&envelope) {
                    Ok(json) => {
                        let _scope = CallbackScope::enter(handle);
                        sink.dispatch(&json);
                    }
                    Err(e) => tracing::error!("failed to serialize event envelope: {e}"),
                }
            });
            tracing::debug!("kartridge_set_event_handler: callback registered for handle {handle}");
        }
        None => {
            session.clear_event_handler();
            tracing::debug!("kartridge_set_event_handler: callback cleared for handle {handle}");
        }
    });
    status(access)
}

fn status(access: Access<()>) -> i32 {
    match access {
        Access::Done(()) => FfiResult::Ok as i32,
        Access::NoHandle => FfiResult::InvalidHandle as i32,
        Access::Busy => FfiResult::Busy as i32,
    }
}

fn flag(access: Access<bool>) -> bool {
    match access {
        Access::Done(value) => value,
        Access::NoHandle | Access::Busy => false,
    }
}

// ─── Lifecycle ───────────────────────────────────────────────────────

/// Check whether Kartridge must relaunch the game. If this returns true the
/// host must exit without calling `kartridge_initialize`.
#[unsafe(no_mangle)]
pub extern "C" fn kartridge_restart_with_kartridge_if_needed(handle: u64, game_id: u32) -> bool {
    flag(with_session(handle, "kartridge_restart_with_kartridge_if_needed", |s| {
        s.restart_with_kartridge_if_needed(game_id)
    }))
}

/// Initialize the SDK. `settings_json` may be null or empty for defaults.
///
/// Returns false when the SDK runs offline (not launched from Kartridge),
/// for unknown handles, and for settings that aren't valid UTF-8.
///
/// # Safety
///
/// `settings_json` must be null or a valid, NUL-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn kartridge_initialize(handle: u64, settings_json: *const c_char) -> bool {
    let settings = if settings_json.is_null() {
        None
    } else {
        match unsafe { read_c_str(settings_json) } {
            Some(s) => Some(s),
            None => {
                tracing::error!("kartridge_initialize: settings are not valid UTF-8");
                return false;
            }
        }
    };
    flag(with_session(handle, "kartridge_initialize", |s| {
        s.initialize(settings.as_deref())
    }))
}

#[unsafe(no_mangle)]
pub extern "C" fn kartridge_shutdown(handle: u64) {
    with_session(handle, "kartridge_shutdown", |s| s.shutdown());
}

/// Poll the SDK; the event callback runs from inside this call.
#[unsafe(no_mangle)]
pub extern "C" fn kartridge_update(handle: u64) {
    with_session(handle, "kartridge_update", |s| s.update());
}

// ─── Queries ─────────────────────────────────────────────────────────

#[unsafe(no_mangle)]
pub extern "C" fn kartridge_is_connected(handle: u64) -> bool {
    read_mirror(handle, |m| m.snapshot.connected).unwrap_or(false)
}

#[unsafe(no_mangle)]
pub extern "C" fn kartridge_is_ready(handle: u64) -> bool {
    read_mirror(handle, |m| m.snapshot.ready).unwrap_or(false)
}

/// Current username as a newly allocated string; free it with
/// `kartridge_free_string`. Null for unknown handles.
#[unsafe(no_mangle)]
pub extern "C" fn kartridge_get_username(handle: u64) -> *mut c_char {
    read_mirror(handle, |m| m.snapshot.username.clone()).map_or(std::ptr::null_mut(), into_c_string)
}

#[unsafe(no_mangle)]
pub extern "C" fn kartridge_get_user_id(handle: u64) -> u32 {
    read_mirror(handle, |m| m.snapshot.user_id).unwrap_or(0)
}

/// Current game auth token as a newly allocated string; free it with
/// `kartridge_free_string`. Null for unknown handles.
#[unsafe(no_mangle)]
pub extern "C" fn kartridge_get_game_auth_token(handle: u64) -> *mut c_char {
    read_mirror(handle, |m| m.snapshot.auth_token.clone())
        .map_or(std::ptr::null_mut(), into_c_string)
}

/// Get a JSON snapshot of the session state.
///
/// Returns a heap-allocated C string that must be freed with `kartridge_free_string`,
/// or null if the handle is invalid.
///
/// ```json
/// {
///   "state": "ready",
///   "connected": true,
///   "ready": true,
///   "user_id": 12345,
///   "username": "player",
///   "auth_token": "..."
/// }
/// ```
#[unsafe(no_mangle)]
pub extern "C" fn kartridge_get_snapshot_json(handle: u64) -> *mut c_char {
    let Some(json) = read_mirror(handle, serde_json::to_string) else {
        return std::ptr::null_mut();
    };
    match json {
        Ok(json) => into_c_string(json),
        Err(e) => {
            tracing::error!("kartridge_get_snapshot_json: {e}");
            std::ptr::null_mut()
        }
    }
}

// ─── Stats ───────────────────────────────────────────────────────────

/// Submit a stat. Fire-and-forget once the SDK is initialized.
///
/// # Safety
///
/// `name` must be a valid, NUL-terminated UTF-8 C string, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn kartridge_submit(handle: u64, name: *const c_char, value: i64) -> i32 {
    if !HANDLES.contains_key(&handle) {
        return FfiResult::InvalidHandle as i32;
    }
    let Some(name) = (unsafe { read_c_str(name) }) else {
        return FfiResult::InvalidArgument as i32;
    };
    status(with_session(handle, "kartridge_submit", |s| s.submit(&name, value)))
}

// ─── Misc ────────────────────────────────────────────────────────────

/// Free a string previously returned by this library.
///
/// # Safety
///
/// `ptr` must be null or a pointer previously returned by a `kartridge_get_*`
/// function. Must not be called more than once for the same pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn kartridge_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

/// Install the crate's tracing subscriber. `filter` may be null for
/// `RUST_LOG` / the default.
///
/// Returns `InvalidArgument` for a filter that isn't valid UTF-8 or doesn't
/// parse, and `Internal` if a subscriber is already installed.
///
/// # Safety
///
/// `filter` must be null or a valid, NUL-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn kartridge_init_logging(filter: *const c_char, json: bool) -> i32 {
    let filter = if filter.is_null() {
        None
    } else {
        match unsafe { read_c_str(filter) } {
            Some(f) => Some(f),
            None => return FfiResult::InvalidArgument as i32,
        }
    };
    match crate::logging::init_logging(filter.as_deref(), json) {
        Ok(()) => FfiResult::Ok as i32,
        Err(KartridgeError::LogFilter { .. }) => FfiResult::InvalidArgument as i32,
        Err(_) => FfiResult::Internal as i32,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        unsafe { kartridge_free_string(ptr) };
        s
    }

    #[test]
    fn test_create_mock_and_destroy() {
        let handle = kartridge_create_mock(true);
        assert_ne!(handle, 0);
        assert!(HANDLES.contains_key(&handle));

        kartridge_destroy(handle);
        assert!(!HANDLES.contains_key(&handle));
        // Second destroy is a no-op
        kartridge_destroy(handle);
    }

    #[test]
    fn test_create_missing_library() {
        let path = CString::new("/nonexistent/libkongregate.so").unwrap();
        let handle = unsafe { kartridge_create(path.as_ptr()) };
        assert_eq!(handle, 0);
    }

    #[test]
    fn test_invalid_handle() {
        assert!(!unsafe { kartridge_initialize(999999, std::ptr::null()) });
        assert!(!kartridge_is_connected(999999));
        assert!(!kartridge_is_ready(999999));
        assert_eq!(kartridge_get_user_id(999999), 0);
        assert!(kartridge_get_username(999999).is_null());
        assert!(kartridge_get_snapshot_json(999999).is_null());
        let name = CString::new("Score").unwrap();
        assert_eq!(
            unsafe { kartridge_submit(999999, name.as_ptr(), 1) },
            FfiResult::InvalidHandle as i32
        );
        assert_eq!(
            unsafe { kartridge_set_event_handler(999999, None, std::ptr::null_mut()) },
            FfiResult::InvalidHandle as i32
        );
        kartridge_update(999999);
        kartridge_shutdown(999999);
    }

    #[test]
    fn test_offline_initialize_returns_defaults() {
        let handle = kartridge_create_mock(false);
        assert!(!unsafe { kartridge_initialize(handle, std::ptr::null()) });
        kartridge_update(handle);

        assert!(!kartridge_is_connected(handle));
        assert!(!kartridge_is_ready(handle));
        assert_eq!(kartridge_get_user_id(handle), 0);
        assert_eq!(unsafe { take_string(kartridge_get_username(handle)) }, "");
        assert_eq!(unsafe { take_string(kartridge_get_game_auth_token(handle)) }, "");

        let snapshot: serde_json::Value =
            serde_json::from_str(&unsafe { take_string(kartridge_get_snapshot_json(handle)) })
                .unwrap();
        assert_eq!(snapshot["state"], "offline");
        assert_eq!(snapshot["connected"], false);

        kartridge_destroy(handle);
    }

    #[test]
    fn test_lifecycle_through_abi() {
        let handle = kartridge_create_mock(true);
        assert!(!kartridge_restart_with_kartridge_if_needed(handle, 42));
        let settings = CString::new(r#"{"debug":true}"#).unwrap();
        assert!(unsafe { kartridge_initialize(handle, settings.as_ptr()) });

        let snapshot: serde_json::Value =
            serde_json::from_str(&unsafe { take_string(kartridge_get_snapshot_json(handle)) })
                .unwrap();
        assert_eq!(snapshot["state"], "disconnected");

        let name = CString::new("HighScore").unwrap();
        assert_eq!(
            unsafe { kartridge_submit(handle, name.as_ptr(), 10) },
            FfiResult::Ok as i32
        );
        assert_eq!(
            unsafe { kartridge_submit(handle, std::ptr::null(), 10) },
            FfiResult::InvalidArgument as i32
        );

        kartridge_shutdown(handle);
        let snapshot: serde_json::Value =
            serde_json::from_str(&unsafe { take_string(kartridge_get_snapshot_json(handle)) })
                .unwrap();
        assert_eq!(snapshot["state"], "shutdown");
        kartridge_destroy(handle);
    }

    #[test]
    fn test_set_and_clear_event_handler() {
        unsafe extern "C" fn noop_cb(_ptr: *const c_char, _len: usize, _user_data: *mut c_void) {}

        let handle = kartridge_create_mock(true);
        let result = unsafe { kartridge_set_event_handler(handle, Some(noop_cb), std::ptr::null_mut()) };
        assert_eq!(result, FfiResult::Ok as i32);
        let result = unsafe { kartridge_set_event_handler(handle, None, std::ptr::null_mut()) };
        assert_eq!(result, FfiResult::Ok as i32);
        kartridge_destroy(handle);
    }

    struct Capture {
        handle: u64,
        events: Vec<serde_json::Value>,
        usernames: Vec<String>,
        submit_codes: Vec<i32>,
    }

    unsafe extern "C" fn capture_cb(ptr: *const c_char, len: usize, user_data: *mut c_void) {
        let capture = unsafe { &mut *(user_data as *mut Capture) };
        let bytes = unsafe { std::slice::from_raw_parts(ptr as *const u8, len) };
        capture.events.push(serde_json::from_slice(bytes).unwrap());
        let username = kartridge_get_username(capture.handle);
        capture.usernames.push(unsafe { take_string(username) });
        let name = CString::new("FromCallback").unwrap();
        capture
            .submit_codes
            .push(unsafe { kartridge_submit(capture.handle, name.as_ptr(), 1) });
    }

    #[test]
    fn test_events_reach_host_callback() {
        use crate::vendor::mock::Step;

        let mock = Arc::new(MockKongregate::new());
        mock.on_update([
            Step::Connect,
            Step::SignIn {
                user_id: 77,
                username: "dana".to_string(),
            },
            Step::Ready,
        ]);
        let handle = register(Box::new(Arc::clone(&mock)), None);
        let mut capture = Capture {
            handle,
            events: Vec::new(),
            usernames: Vec::new(),
            submit_codes: Vec::new(),
        };
        let result = unsafe {
            kartridge_set_event_handler(
                handle,
                Some(capture_cb),
                &mut capture as *mut Capture as *mut c_void,
            )
        };
        assert_eq!(result, FfiResult::Ok as i32);
        assert!(unsafe { kartridge_initialize(handle, std::ptr::null()) });

        kartridge_update(handle);

        let types: Vec<_> = capture.events.iter().map(|e| e["event"]["type"].clone()).collect();
        assert_eq!(types, vec!["connected", "user", "ready"]);
        let seqs: Vec<_> = capture.events.iter().map(|e| e["seq"].as_u64().unwrap()).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(
            capture.events[1]["event"]["data"],
            "Kongregate API user info change, username=dana"
        );
        // Queries from inside the callback see the state as of each event.
        assert_eq!(capture.usernames, vec!["", "dana", "dana"]);
        // Driving the session from inside its own callback is refused.
        assert!(capture.submit_codes.iter().all(|&c| c == FfiResult::Busy as i32));
        assert!(mock.submitted().is_empty());

        assert!(kartridge_is_ready(handle));
        assert_eq!(kartridge_get_user_id(handle), 77);

        kartridge_destroy(handle);
        assert_eq!(mock.count(&crate::vendor::mock::VendorCall::Shutdown), 1);
    }

    #[test]
    fn test_envelope_type_is_kind_not_vendor_tag() {
        use crate::event::EventTags;
        use crate::vendor::mock::Step;

        let tags = EventTags {
            auth_token: "KONGREGATE_EVENT_AUTH_TOKEN".to_string(),
            ..EventTags::default()
        };
        let mock = Arc::new(MockKongregate::new().with_tags(tags));
        mock.on_update([Step::AuthToken("tok".to_string())]);
        let handle = register(Box::new(Arc::clone(&mock)), None);
        let mut capture = Capture {
            handle,
            events: Vec::new(),
            usernames: Vec::new(),
            submit_codes: Vec::new(),
        };
        unsafe {
            kartridge_set_event_handler(handle, Some(capture_cb), &mut capture as *mut Capture as *mut c_void);
            assert!(kartridge_initialize(handle, std::ptr::null()));
        }
        kartridge_update(handle);

        assert_eq!(capture.events.len(), 1);
        assert_eq!(capture.events[0]["event"]["type"], "auth_token");
        assert_eq!(capture.events[0]["event"]["data"], r#"{"token":"tok"}"#);
        kartridge_destroy(handle);
    }

    struct Destroying {
        handle: u64,
        calls: usize,
    }

    unsafe extern "C" fn destroying_cb(_ptr: *const c_char, _len: usize, user_data: *mut c_void) {
        let state = unsafe { &mut *(user_data as *mut Destroying) };
        state.calls += 1;
        kartridge_destroy(state.handle);
    }

    #[test]
    fn test_destroy_inside_callback_stops_delivery() {
        use crate::vendor::mock::{Step, VendorCall};

        let mock = Arc::new(MockKongregate::new());
        mock.on_update([Step::Connect, Step::Ready, Step::Disconnect]);
        let handle = register(Box::new(Arc::clone(&mock)), None);
        let mut state = Destroying { handle, calls: 0 };
        unsafe {
            kartridge_set_event_handler(
                handle,
                Some(destroying_cb),
                &mut state as *mut Destroying as *mut c_void,
            )
        };
        assert!(unsafe { kartridge_initialize(handle, std::ptr::null()) });

        kartridge_update(handle);

        assert_eq!(state.calls, 1);
        assert!(!HANDLES.contains_key(&handle));
        // The vendor still ran the whole frame; the session shut down afterwards.
        assert_eq!(mock.count(&VendorCall::Shutdown), 1);
        assert!(!kartridge_is_ready(handle));
    }

    struct Relay {
        update: Option<u64>,
        submit: Option<u64>,
        calls: usize,
        submit_codes: Vec<i32>,
    }

    unsafe extern "C" fn relay_cb(_ptr: *const c_char, _len: usize, user_data: *mut c_void) {
        let relay = unsafe { &mut *(user_data as *mut Relay) };
        relay.calls += 1;
        if let Some(other) = relay.update {
            kartridge_update(other);
        }
        if let Some(other) = relay.submit {
            let name = CString::new("Relayed").unwrap();
            relay
                .submit_codes
                .push(unsafe { kartridge_submit(other, name.as_ptr(), 1) });
        }
    }

    #[test]
    fn test_nested_callbacks_refuse_outer_handle() {
        use crate::vendor::mock::Step;

        let mock_a = Arc::new(MockKongregate::new());
        mock_a.on_update([Step::Connect]);
        let mock_b = Arc::new(MockKongregate::new());
        mock_b.on_update([Step::Ready]);
        let a = register(Box::new(Arc::clone(&mock_a)), None);
        let b = register(Box::new(Arc::clone(&mock_b)), None);

        let mut relay_a = Relay {
            update: Some(b),
            submit: None,
            calls: 0,
            submit_codes: Vec::new(),
        };
        let mut relay_b = Relay {
            update: None,
            submit: Some(a),
            calls: 0,
            submit_codes: Vec::new(),
        };
        unsafe {
            kartridge_set_event_handler(a, Some(relay_cb), &mut relay_a as *mut Relay as *mut c_void);
            kartridge_set_event_handler(b, Some(relay_cb), &mut relay_b as *mut Relay as *mut c_void);
            assert!(kartridge_initialize(a, std::ptr::null()));
            assert!(kartridge_initialize(b, std::ptr::null()));
        }

        kartridge_update(a);

        assert_eq!(relay_a.calls, 1);
        assert_eq!(relay_b.calls, 1);
        assert_eq!(relay_b.submit_codes, vec![FfiResult::Busy as i32]);
        assert!(mock_a.submitted().is_empty());
        assert!(kartridge_is_ready(b));

        // Outside any callback both handles accept calls again.
        let name = CString::new("After").unwrap();
        assert_eq!(unsafe { kartridge_submit(a, name.as_ptr(), 2) }, FfiResult::Ok as i32);
        assert_eq!(mock_a.submitted(), vec![("After".to_string(), 2)]);

        kartridge_destroy(a);
        kartridge_destroy(b);
    }

    #[test]
    fn test_library_claim_is_exclusive() {
        let first = LibraryClaim::acquire().unwrap();
        assert!(LibraryClaim::acquire().is_none());
        drop(first);
        assert!(LibraryClaim::acquire().is_some());
    }

    #[test]
    fn test_init_logging_bad_filter_is_invalid_argument() {
        let filter = CString::new("kartridge_core=loud").unwrap();
        assert_eq!(
            unsafe { kartridge_init_logging(filter.as_ptr(), false) },
            FfiResult::InvalidArgument as i32
        );
    }

    #[test]
    fn test_free_null_string() {
        // Should not crash
        unsafe { kartridge_free_string(std::ptr::null_mut()) };
    }
}
