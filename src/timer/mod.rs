//! Sleep timer module
//!
//! This module contains the countdown state machine, the schedulers that
//! drive it and the events it emits.

pub mod events;
pub mod scheduler;
pub mod sleep_timer;

// Re-export main types
pub use events::{ListenerId, TickEvent, TimerEvent};
pub use scheduler::{ManualScheduler, ScheduledTask, Scheduler, Task, TokioScheduler};
pub use sleep_timer::{SleepTimer, PRESET_DURATIONS_MS, TICK_INTERVAL_MS};
