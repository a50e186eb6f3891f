//! Sleep Timer - a countdown timer that fades out and stops audio playback
//!
//! This is the main entry point for the sleep-timer application.

use anyhow::Context;
use tokio::task::LocalSet;
use tracing::info;

use sleep_timer::{
    config::Config,
    state::SettingsStore,
    tasks::{sleep_session_task, PlaybackVolume, SessionOutcome},
    timer::SleepTimer,
    utils::{control_signals, format_time},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("sleep_timer={}", config.log_level()))
        .init();

    info!("Starting sleep-timer v1.0.0");

    let store = config.settings.as_ref().map(SettingsStore::new);
    let stored = match &store {
        Some(store) => store
            .load()
            .with_context(|| format!("loading settings from {}", store.path().display()))?,
        None => Default::default(),
    };
    let settings = config.apply_to(stored);
    info!(
        "Configuration: duration={}, fade_out={} ({}s), auto_stop={}, volume={}%",
        format_time(config.duration_ms()),
        settings.fade_out,
        settings.fade_out_duration_secs,
        settings.auto_stop,
        config.volume
    );

    let signals = control_signals().context("installing signal handlers")?;
    let mut volume = PlaybackVolume::new(config.volume);

    // The timer and its scheduler live on this thread only
    let local = LocalSet::new();
    let outcome = local
        .run_until(async {
            let timer = SleepTimer::new();
            timer.apply_settings(settings);
            // Running the binary is an explicit request for a timer
            timer.set_enabled(true);
            timer.start(config.duration_ms());

            let outcome =
                sleep_session_task(timer.clone(), signals, &mut volume, config.extend_minutes).await;
            timer.release();
            outcome
        })
        .await;

    if let Some(store) = &store {
        store
            .save(&settings)
            .with_context(|| format!("saving settings to {}", store.path().display()))?;
    }

    match outcome {
        SessionOutcome::Stopped => info!("Playback stopped, volume at {:.0}%", volume.current() * 100.0),
        SessionOutcome::Expired => info!("Timer expired"),
        SessionOutcome::Cancelled => info!("Timer cancelled"),
    }

    info!("Sleep timer shutdown complete");
    Ok(())
}
