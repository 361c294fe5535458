//! Platform-specific providers.

pub mod picarto;
pub mod twitch;

pub use picarto::Picarto;
pub use twitch::{Twitch, TwitchCredentials};
