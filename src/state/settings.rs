//! Timer settings structure

use serde::{Deserialize, Serialize};

/// Default fade-out window in seconds
pub const DEFAULT_FADE_OUT_SECS: u64 = 30;

/// User-facing timer configuration, persisted between sessions
///
/// Serialized as four scalar fields in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSettings {
    /// When false, `start` is ignored
    pub enabled: bool,
    /// Whether playback should stop when the countdown finishes
    pub auto_stop: bool,
    /// Whether ticks near the end carry a fade-out ratio
    pub fade_out: bool,
    /// Length of the fade-out window
    pub fade_out_duration_secs: u64,
}

impl TimerSettings {
    /// Create settings with the default values
    pub fn new() -> Self {
        Self {
            enabled: true,
            auto_stop: true,
            fade_out: false,
            fade_out_duration_secs: DEFAULT_FADE_OUT_SECS,
        }
    }

    /// Fade-out ratio for a tick with `remaining_ms` left, if the tick falls inside the window
    pub fn fade_ratio(&self, remaining_ms: u64) -> Option<f32> {
        if !self.fade_out || self.fade_out_duration_secs == 0 {
            return None;
        }
        let window_ms = self.fade_out_duration_secs.saturating_mul(1000);
        if remaining_ms <= window_ms {
            Some(remaining_ms as f32 / window_ms as f32)
        } else {
            None
        }
    }
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = TimerSettings::default();
        assert!(settings.enabled);
        assert!(settings.auto_stop);
        assert!(!settings.fade_out);
        assert_eq!(settings.fade_out_duration_secs, 30);
    }

    #[test]
    fn fade_ratio_inside_window() {
        let settings = TimerSettings {
            fade_out: true,
            fade_out_duration_secs: 10,
            ..TimerSettings::default()
        };
        assert_eq!(settings.fade_ratio(10_000), Some(1.0));
        assert_eq!(settings.fade_ratio(5_000), Some(0.5));
        assert_eq!(settings.fade_ratio(10_001), None);
    }

    #[test]
    fn fade_ratio_disabled_or_empty_window() {
        let off = TimerSettings::default();
        assert_eq!(off.fade_ratio(1_000), None);

        let empty = TimerSettings {
            fade_out: true,
            fade_out_duration_secs: 0,
            ..TimerSettings::default()
        };
        assert_eq!(empty.fade_ratio(0), None);
    }

    #[test]
    fn serialized_field_order() {
        let json = serde_json::to_string(&TimerSettings::default()).unwrap();
        assert_eq!(
            json,
            r#"{"enabled":true,"auto_stop":true,"fade_out":false,"fade_out_duration_secs":30}"#
        );
    }
}
