//! Configuration and CLI argument handling

use std::path::PathBuf;

use clap::Parser;

use crate::{state::TimerSettings, timer::PRESET_DURATIONS_MS};

/// CLI argument parsing structure
#[derive(Debug, Parser)]
#[command(name = "sleep-timer")]
#[command(about = "A countdown sleep timer that fades out and stops playback")]
#[command(version = "1.0.0")]
pub struct Config {
    /// Timer duration in minutes
    #[arg(short, long, default_value = "30", conflicts_with = "preset")]
    pub minutes: u64,

    /// Use a preset duration instead (0=15m, 1=30m, 2=45m, 3=1h, 4=1h30m, 5=2h)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..6))]
    pub preset: Option<u8>,

    /// Report a fade-out ratio during the last seconds
    #[arg(long)]
    pub fade_out: bool,

    /// Fade-out window in seconds
    #[arg(long)]
    pub fade_out_duration: Option<u64>,

    /// Only report expiry instead of stopping playback
    #[arg(long)]
    pub no_auto_stop: bool,

    /// Base playback volume in percent, scaled down while fading out
    #[arg(long, default_value = "100", value_parser = clap::value_parser!(u8).range(0..=100))]
    pub volume: u8,

    /// Minutes added on SIGUSR2
    #[arg(long, default_value = "5")]
    pub extend_minutes: u64,

    /// JSON file to load settings from and save them back to
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Countdown length selected on the command line
    pub fn duration_ms(&self) -> u64 {
        let minutes_ms = self.minutes.saturating_mul(60_000);
        match self.preset {
            Some(index) => PRESET_DURATIONS_MS
                .get(usize::from(index))
                .copied()
                .unwrap_or(minutes_ms),
            None => minutes_ms,
        }
    }

    /// Overlay the flags given on the command line onto stored settings
    ///
    /// The stored `enabled` flag is kept as is, so the record round-trips.
    pub fn apply_to(&self, mut settings: TimerSettings) -> TimerSettings {
        if self.fade_out {
            settings.fade_out = true;
        }
        if let Some(secs) = self.fade_out_duration {
            settings.fade_out_duration_secs = secs;
        }
        if self.no_auto_stop {
            settings.auto_stop = false;
        }
        settings
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }
}
