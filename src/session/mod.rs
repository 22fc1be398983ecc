//! Scan sessions and the controller that drives them.
//!
//! * [`data`]: the session model and its [`ScanState`] machine.
//! * [`events`]: the bounded event queue the engine reports through.
//! * [`controller`]: [`ScanController`], the engine's public entry point.

pub mod controller;
pub mod data;
pub mod events;

pub use controller::{EngineOptions, ScanController, SessionHandle};
pub use data::{ScanSession, ScanState, SessionCounters};
pub use events::{event_channel, EngineEvent, EventSender, DEFAULT_EVENT_CAPACITY};
