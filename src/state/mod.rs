//! State management module
//! 
//! This module contains the timer's value types and settings persistence.

pub mod settings;
pub mod settings_store;
pub mod timer_state;

// Re-export main types
pub use settings::TimerSettings;
pub use settings_store::{SettingsStore, StoreError};
pub use timer_state::{TimerInfo, TimerState};
