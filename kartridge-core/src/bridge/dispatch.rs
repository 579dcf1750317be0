//! Routing vendor callbacks back to the session that is polling.
//!
//! The SDK listener is a bare `(name, payload)` function pointer with no user
//! data. [`vendor_event_listener`] is registered once, and [`polling`]
//! installs the polling session's sink in a thread-local slot for exactly
//! the duration of one vendor `update`. A callback arriving while no sink is
//! installed has nowhere to go and is dropped.

use std::cell::Cell;
use std::ffi::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr::NonNull;

use crate::vendor::copy_c_str;

type Sink = dyn FnMut(&str, &str);

thread_local! {
    static ACTIVE: Cell<Option<NonNull<Sink>>> = const { Cell::new(None) };
}

/// Puts the previous slot value back when dropped, including on unwind.
struct Restore(Option<NonNull<Sink>>);

impl Drop for Restore {
    fn drop(&mut self) {
        ACTIVE.with(|slot| slot.set(self.0));
    }
}

/// Run `poll` with `sink` receiving every vendor event fired on this thread.
pub(crate) fn polling<R>(sink: &mut dyn FnMut(&str, &str), poll: impl FnOnce() -> R) -> R {
    let ptr: NonNull<dyn FnMut(&str, &str) + '_> = NonNull::from(sink);
    // Safety: the slot only holds this pointer until `_restore` drops at the
    // end of this function, while `sink` is still mutably borrowed here.
    let ptr: NonNull<Sink> = unsafe { std::mem::transmute(ptr) };
    let previous = ACTIVE.with(|slot| slot.replace(Some(ptr)));
    let _restore = Restore(previous);
    poll()
}

/// Hand one event to the installed sink. Returns `false` if none is installed.
pub(crate) fn deliver(tag: &str, payload: &str) -> bool {
    // Taken out of the slot while running so a nested callback can't alias it.
    let Some(mut sink) = ACTIVE.with(Cell::take) else {
        return false;
    };
    let _restore = Restore(Some(sink));
    // Safety: the pointer came from `polling`, which is still on the stack.
    unsafe { sink.as_mut()(tag, payload) };
    true
}

/// The listener registered with the SDK.
///
/// Copies both strings before anything else runs; the vendor reclaims them
/// after the call returns. Never unwinds into vendor code.
///
/// # Safety
///
/// Each argument must be null or a NUL-terminated string valid for the call.
pub unsafe extern "C" fn vendor_event_listener(
    event_name: *const c_char,
    event_payload: *const c_char,
) {
    if event_name.is_null() {
        tracing::warn!("vendor fired an event with a null name, dropping");
        return;
    }
    let tag = unsafe { copy_c_str(event_name) };
    let payload = unsafe { copy_c_str(event_payload) };

    match catch_unwind(AssertUnwindSafe(|| deliver(&tag, &payload))) {
        Ok(true) => {}
        Ok(false) => tracing::debug!(%tag, "vendor event outside of update, dropping"),
        Err(_) => tracing::error!(%tag, "event handler panicked"),
    }
}
