//! followed-streams library crate.
//!
//! Tracks streams across platforms and reports when they go live or
//! offline. The poll loop lives in [`checker`]; snapshots persist in a
//! [`store::SharedStateStore`].

pub mod checker;
pub mod config;
pub mod error;
pub mod logging;
pub mod store;

pub use checker::{CycleReport, NotifChecker, StreamEvent};
pub use config::CheckerConfig;
pub use error::{Error, Result};
