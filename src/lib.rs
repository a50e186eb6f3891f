//! Sleep Timer - a countdown timer that fades out and stops audio playback
//! 
//! This library provides a single-threaded sleep timer state machine with
//! pause, resume and extend operations, fade-out signalling, settings
//! persistence and an async session that drives it from the command line.

pub mod config;
pub mod state;
pub mod tasks;
pub mod timer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use state::{SettingsStore, TimerInfo, TimerSettings, TimerState};
pub use timer::{ManualScheduler, SleepTimer, TimerEvent, TokioScheduler};
pub use utils::format_time;
