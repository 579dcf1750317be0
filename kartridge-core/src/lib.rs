//! Bridge between the Kongregate Kartridge SDK and game hosts.
//!
//! The SDK is a C library with a poll-and-callback model: the game calls
//! `update` every frame and the SDK fires string-tagged events at a single
//! registered function pointer. This crate wraps it two ways:
//!
//! - [`Session`], a Rust context object that owns the event handler, enforces
//!   call ordering and hands out owned values only.
//! - A C ABI (`kartridge_*`, see [`bridge::abi`]) for hosts that load this
//!   crate as a `cdylib`, delivering events as JSON envelopes.
//!
//! The vendor library is opened at runtime ([`KartridgeLibrary`]); a scripted
//! in-process stand-in ([`MockKongregate`]) exercises the same paths.

pub mod bridge;
pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod session;
pub mod vendor;

pub use config::BridgeConfig;
pub use error::{FfiResult, KartridgeError};
pub use event::{Event, EventKind, EventTags};
pub use session::{Session, SessionState, Snapshot};
pub use vendor::library::KartridgeLibrary;
pub use vendor::mock::{MockKongregate, Step, VendorCall};
pub use vendor::KongregateApi;
