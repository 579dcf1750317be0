//! Host-side event callback: a C function pointer plus opaque user data.

use std::ffi::{c_char, c_void, CString};

/// C callback signature for hosts: a UTF-8 JSON envelope (pointer + length)
/// and the user data passed at registration.
///
/// The JSON buffer is only valid for the duration of the call.
pub type HostEventCallback =
    unsafe extern "C" fn(json_ptr: *const c_char, json_len: usize, user_data: *mut c_void);

/// Wraps a host callback with its user_data pointer.
///
/// The host keeps the callback and user_data valid until it is replaced,
/// cleared, or the handle is destroyed.
pub struct CallbackSink {
    cb: HostEventCallback,
    user_data: *mut c_void,
}

// Safety: the sink is only invoked from `kartridge_update`, on whichever
// thread the host polls from; the host owns the user_data contract.
unsafe impl Send for CallbackSink {}

impl CallbackSink {
    pub fn new(cb: HostEventCallback, user_data: *mut c_void) -> Self {
        Self { cb, user_data }
    }

    /// Invoke the callback with a JSON string.
    ///
    /// A string with an interior NUL byte is dropped (serde_json escapes NUL,
    /// so well-formed envelopes never hit this).
    pub fn dispatch(&self, json: &str) {
        let Ok(cstr) = CString::new(json) else {
            tracing::warn!("event JSON contained interior NUL byte, dropping");
            return;
        };
        unsafe {
            (self.cb)(cstr.as_ptr(), json.len(), self.user_data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    unsafe extern "C" fn capture_cb(ptr: *const c_char, len: usize, user_data: *mut c_void) {
        let out = unsafe { &mut *(user_data as *mut Vec<(String, usize)>) };
        let json = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        out.push((json, len));
    }

    #[test]
    fn test_callback_dispatch_passes_user_data() {
        let mut received: Vec<(String, usize)> = Vec::new();
        let sink = CallbackSink::new(capture_cb, &mut received as *mut _ as *mut c_void);
        sink.dispatch(r#"{"type":"ready"}"#);
        drop(sink);

        assert_eq!(received, vec![(r#"{"type":"ready"}"#.to_string(), 16)]);
    }

    #[test]
    fn test_interior_nul_is_dropped() {
        let mut received: Vec<(String, usize)> = Vec::new();
        let sink = CallbackSink::new(capture_cb, &mut received as *mut _ as *mut c_void);
        sink.dispatch("bad\0json");
        drop(sink);

        assert!(received.is_empty());
    }
}
