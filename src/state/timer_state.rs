//! Timer state and snapshot structures

use serde::{Deserialize, Serialize};

/// Observable state of the sleep timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    Running,
    Paused,
    Stopped,
}

impl TimerState {
    /// Check if the timer is counting down or holding a paused countdown
    pub fn is_active(&self) -> bool {
        matches!(self, TimerState::Running | TimerState::Paused)
    }
}

impl Default for TimerState {
    fn default() -> Self {
        TimerState::Stopped
    }
}

impl std::fmt::Display for TimerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TimerState::Running => "running",
            TimerState::Paused => "paused",
            TimerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Read-only snapshot of the timer, computed on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerInfo {
    pub state: TimerState,
    pub remaining_ms: u64,
    pub total_duration_ms: u64,
    pub elapsed_ms: u64,
    /// Fraction of the countdown already elapsed, in `0.0..=1.0`
    pub progress: f32,
    pub enabled: bool,
    pub auto_stop: bool,
    pub fade_out: bool,
    pub fade_out_duration_secs: u64,
}

impl TimerInfo {
    /// Check if the snapshot was taken while a countdown was running
    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    /// Remaining time, only meaningful while running
    pub fn remaining_seconds(&self) -> Option<u64> {
        if self.is_running() {
            Some(self.remaining_ms / 1000)
        } else {
            None
        }
    }
}
