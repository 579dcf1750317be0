//! Everything that crosses the C boundary: the vendor listener, the event
//! bridge, the host callback, the JSON envelope, and the exported
//! `kartridge_*` functions.

pub mod abi;
pub mod adapter;
pub mod callback;
pub(crate) mod dispatch;
pub mod envelope;

pub use adapter::{EventBridge, EventHandler};
pub use dispatch::vendor_event_listener;
