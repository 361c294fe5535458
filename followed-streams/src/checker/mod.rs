//! Live-status change detection for followed streams.
//!
//! [`NotifChecker`] polls every tracked stream through its platform's
//! provider, writes the fresh snapshots back to the shared store and
//! publishes [`StreamEvent`]s for streams that went live or offline.

pub mod debounce;
pub mod events;
mod service;

pub use debounce::{Debouncer, OFFLINE_CONFIRMATIONS, Transition, Transitions};
pub use events::{StreamEvent, StreamEventBroadcaster};
pub use service::{CycleReport, NotifChecker};
