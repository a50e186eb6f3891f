//! Background tasks module
//! 
//! This module contains the async session that hosts a sleep timer and
//! plays the part of the playback controller.

pub mod sleep_session;

// Re-export main functions
pub use sleep_session::{sleep_session_task, PlaybackVolume, SessionOutcome};
